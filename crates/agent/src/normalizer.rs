//! Canonicalises raw user text before planning.
//!
//! Code-mixed (Hinglish) phrasing and Devanagari script are mapped onto the
//! English vocabulary the planners understand. The transformation is total:
//! text with nothing to rewrite comes back lower-cased and whitespace-trimmed.

/// Whole-token rewrites. A target may expand to several words.
const TOKEN_MAP: &[(&str, &str)] = &[
    // cities
    ("dilli", "delhi"),
    ("dehli", "delhi"),
    ("bombay", "mumbai"),
    ("bambai", "mumbai"),
    ("calcutta", "kolkata"),
    ("bangalore", "bengaluru"),
    ("bengalooru", "bengaluru"),
    ("poona", "pune"),
    // dates
    ("aaj", "today"),
    ("kal", "tomorrow"),
    ("parso", "day after tomorrow"),
    ("parson", "day after tomorrow"),
    ("tmrw", "tomorrow"),
    ("tmr", "tomorrow"),
    ("tomorow", "tomorrow"),
    // times
    ("baje", "oclock"),
    ("shaam", "evening"),
    ("sham", "evening"),
    ("raat", "night"),
    ("dopahar", "afternoon"),
    ("subah", "morning"),
    // people
    ("log", "people"),
    ("logon", "people"),
    ("logo", "people"),
    ("ppl", "people"),
    ("pax", "people"),
    ("persons", "people"),
    ("guests", "people"),
    // yes / no
    ("haan", "yes"),
    ("haa", "yes"),
    ("haanji", "yes"),
    ("theek", "ok"),
    ("thik", "ok"),
    ("nahi", "no"),
    ("nahin", "no"),
    // requests
    ("batao", "show"),
    ("bolo", "show"),
    ("dikhao", "show"),
    ("suggest", "recommend"),
    ("chahiye", "want"),
    ("karo", ""),
    ("kardo", ""),
    ("mujhe", ""),
    ("humko", ""),
    ("hume", ""),
    ("please", ""),
    ("pls", ""),
    ("plz", ""),
    ("acha", "good"),
    ("accha", "good"),
    ("achha", "good"),
    ("badhiya", "good"),
    ("khana", "food"),
    ("resturant", "restaurant"),
    ("restraunt", "restaurant"),
    ("restaraunt", "restaurant"),
    ("resto", "restaurant"),
    ("restaurants", "restaurant"),
    ("mein", "in"),
    ("ke", "for"),
    ("liye", ""),
    ("ka", ""),
    ("ki", ""),
    ("ko", ""),
    ("hai", ""),
    ("namaste", "hello"),
    ("namaskar", "hello"),
    ("shukriya", "thanks"),
    ("dhanyavad", "thanks"),
    // number words
    ("ek", "1"),
    ("teen", "3"),
    ("chaar", "4"),
    ("paanch", "5"),
    ("panch", "5"),
    ("chhe", "6"),
    ("saat", "7"),
    ("aath", "8"),
    ("nau", "9"),
];

/// Devanagari words, matched before transliterated tokens.
const DEVANAGARI_MAP: &[(&str, &str)] = &[
    ("दिल्ली", "delhi"),
    ("मुंबई", "mumbai"),
    ("कोलकाता", "kolkata"),
    ("बेंगलुरु", "bengaluru"),
    ("पुणे", "pune"),
    ("आज", "today"),
    ("कल", "tomorrow"),
    ("परसों", "day after tomorrow"),
    ("लोगों", "people"),
    ("लोग", "people"),
    ("बजे", "oclock"),
    ("शाम", "evening"),
    ("रात", "night"),
    ("हाँ", "yes"),
    ("हां", "yes"),
    ("नहीं", "no"),
    ("बुक", "book"),
    ("टेबल", "table"),
    ("रद्द", "cancel"),
];

/// Maps a raw utterance to canonical text. Pure and infallible.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    for (source, target) in DEVANAGARI_MAP {
        if text.contains(source) {
            text = text.replace(source, &format!(" {target} "));
        }
    }

    let text = fold_digits(&text).to_lowercase().replace("a.m.", "am").replace("p.m.", "pm");
    let cleaned = strip_punctuation(&text);

    cleaned
        .split_whitespace()
        .map(|token| match TOKEN_MAP.iter().find(|(source, _)| *source == token) {
            Some((_, target)) => *target,
            None => token,
        })
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn fold_digits(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '०'..='९' => char::from(b'0' + (ch as u32 - '०' as u32) as u8),
            other => other,
        })
        .collect()
}

/// Keeps characters that carry meaning for slot extraction: `:` and `.`
/// inside times, `/` and `-` inside dates and ids, and a leading `+` on phones.
fn strip_punctuation(text: &str) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    let mut cleaned = String::with_capacity(text.len());
    for (index, ch) in chars.iter().copied().enumerate() {
        let prev = index.checked_sub(1).and_then(|i| chars.get(i)).copied();
        let next = chars.get(index + 1).copied();
        let between_alnum = prev.is_some_and(|c| c.is_alphanumeric())
            && next.is_some_and(|c| c.is_alphanumeric());
        let between_digits =
            prev.is_some_and(|c| c.is_ascii_digit()) && next.is_some_and(|c| c.is_ascii_digit());

        match ch {
            c if c.is_alphanumeric() => cleaned.push(c),
            '\'' | '’' => {}
            ':' | '.' if between_digits => cleaned.push(':'),
            '/' if between_digits => cleaned.push('/'),
            '-' if between_alnum => cleaned.push('-'),
            '+' if next.is_some_and(|c| c.is_ascii_digit()) => cleaned.push('+'),
            _ => cleaned.push(' '),
        }
    }
    cleaned
}
