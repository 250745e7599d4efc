use folio_core::{Rect, Word};

/// Groups positioned characters, in content order, into words.
///
/// A word ends at whitespace, at a character that does not share the current word's line,
/// or at a character that jumps back to the left of it.
pub fn group_glyphs<I>(glyphs: I) -> Vec<Word>
where
    I: IntoIterator<Item = (char, Rect)>,
{
    let mut words = Vec::new();
    let mut current: Option<(String, Rect)> = None;

    for (ch, bounds) in glyphs {
        if ch.is_whitespace() || ch.is_control() || !bounds.is_valid() {
            flush(&mut current, &mut words);
            continue;
        }
        match current.as_mut() {
            Some((text, acc)) if continues(acc, &bounds) => {
                text.push(ch);
                *acc = acc.union(&bounds);
            }
            _ => {
                flush(&mut current, &mut words);
                current = Some((ch.to_string(), bounds));
            }
        }
    }
    flush(&mut current, &mut words);
    words
}

fn continues(word: &Rect, next: &Rect) -> bool {
    let same_line = next.top < word.bottom && next.bottom > word.top;
    let slack = (word.height() * 0.5).max(1.0);
    same_line && next.left >= word.left && next.left <= word.right + slack
}

fn flush(current: &mut Option<(String, Rect)>, words: &mut Vec<Word>) {
    if let Some((text, bounds)) = current.take() {
        words.push(Word::new(text, bounds));
    }
}
