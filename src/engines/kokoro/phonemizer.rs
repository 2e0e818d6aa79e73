use std::collections::HashMap;

use crate::engines::espeak::EspeakConfig;
use crate::TtsError;

/// espeak-ng language implied by a Kokoro voice name prefix (`af_heart` ->
/// `en-us`), or `None` for an unknown prefix.
pub fn voice_lang(voice: &str) -> Option<&'static str> {
    let lang = match voice.get(..2)? {
        "af" | "am" => "en-us",
        "bf" | "bm" => "en-gb",
        "ef" | "em" => "es",
        "ff" => "fr",
        "hf" | "hm" => "hi",
        "if" | "im" => "it",
        "jf" | "jm" => "ja",
        "pf" | "pm" => "pt-br",
        "zf" | "zm" => "cmn",
        _ => return None,
    };
    Some(lang)
}

/// Convert text to Kokoro phoneme token ids.
///
/// Runs of words go through espeak-ng as IPA; punctuation is mapped to its
/// own token so pauses survive. Symbols missing from `vocab` are dropped.
pub fn phonemize(
    text: &str,
    lang: &str,
    vocab: &HashMap<char, i64>,
    espeak: &EspeakConfig,
) -> Result<Vec<i64>, TtsError> {
    let parts = split_text_parts(text);
    let words: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            TextPart::Words(words) => Some(words.as_str()),
            TextPart::Punct(_) => None,
        })
        .collect();
    if words.is_empty() {
        return Ok(parts
            .iter()
            .filter_map(|part| match part {
                TextPart::Punct(ch) => vocab.get(ch).copied(),
                TextPart::Words(_) => None,
            })
            .collect());
    }

    let mut word_ids = ipa_lines(&words, lang, espeak)?
        .into_iter()
        .map(|line| ipa_to_ids(&line, vocab));

    let mut ids = Vec::new();
    for part in &parts {
        match part {
            TextPart::Words(_) => ids.extend(word_ids.next().unwrap_or_default()),
            TextPart::Punct(ch) => ids.extend(vocab.get(ch)),
        }
    }
    Ok(ids)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Words(String),
    Punct(char),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        if let Some(punct) = boundary_punctuation(ch) {
            if !joins_digits(text, idx, ch) {
                flush_words(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }
        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
        } else {
            current.push(ch);
        }
    }
    flush_words(&mut parts, &mut current);
    parts
}

fn flush_words(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(TextPart::Words(trimmed.to_string()));
    }
    current.clear();
}

fn boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

/// `2.0` and `1,000` keep their separator inside the word run.
fn joins_digits(text: &str, idx: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }
    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch.len_utf8()..].chars().next();
    matches!((prev, next), (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit())
}

/// IPA for each word run, one espeak-ng call for the batch when its output
/// lines up with the input, one call per run otherwise.
fn ipa_lines(words: &[&str], lang: &str, espeak: &EspeakConfig) -> Result<Vec<String>, TtsError> {
    let args = ["--ipa", "--stdin", "-q", "-v", lang];
    let batched = espeak.run(args, &words.join("\n"))?;
    let lines: Vec<String> = batched.lines().map(str::to_string).collect();
    if lines.len() == words.len() {
        return Ok(lines);
    }
    log::debug!(
        "espeak-ng returned {} lines for {} inputs, phonemizing one at a time",
        lines.len(),
        words.len()
    );
    words.iter().map(|w| espeak.run(args, w)).collect()
}

fn ipa_to_ids(ipa: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    ipa.lines()
        .flat_map(|line| line.trim().chars())
        .filter(|&ch| ch != '_')
        .filter_map(|ch| vocab.get(&ch).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::espeak::espeak_available;

    #[test]
    fn splits_words_and_punctuation() {
        assert_eq!(
            split_text_parts("Hello, world. Testing!"),
            vec![
                TextPart::Words("Hello".into()),
                TextPart::Punct(','),
                TextPart::Words("world".into()),
                TextPart::Punct('.'),
                TextPart::Words("Testing".into()),
                TextPart::Punct('!'),
            ]
        );
    }

    #[test]
    fn digit_separators_stay_inside_words() {
        assert_eq!(
            split_text_parts("Version 2.0 reached 1,000 users."),
            vec![
                TextPart::Words("Version 2.0 reached 1,000 users".into()),
                TextPart::Punct('.'),
            ]
        );
        assert_eq!(
            split_text_parts("Value 2, next"),
            vec![
                TextPart::Words("Value 2".into()),
                TextPart::Punct(','),
                TextPart::Words("next".into()),
            ]
        );
    }

    #[test]
    fn voice_prefix_selects_language() {
        assert_eq!(voice_lang("bf_emma"), Some("en-gb"));
        assert_eq!(voice_lang("zf_xiaobei"), Some("cmn"));
        assert_eq!(voice_lang("custom"), None);
        assert_eq!(voice_lang("x"), None);
    }

    #[test]
    fn ipa_maps_through_vocab_and_skips_ties() {
        let vocab: HashMap<char, i64> = [('h', 50), ('ə', 83), ('l', 54)].into_iter().collect();
        assert_eq!(ipa_to_ids("hə_l?\n", &vocab), vec![50, 83, 54]);
    }

    #[test]
    fn punctuation_only_text_needs_no_espeak() {
        let vocab: HashMap<char, i64> = [('.', 4), ('!', 5)].into_iter().collect();
        let espeak = EspeakConfig {
            bin_path: Some("/nonexistent/espeak-ng".into()),
            data_path: None,
        };
        assert_eq!(phonemize("...!", "en-us", &vocab, &espeak).unwrap(), vec![4, 4, 4, 5]);
    }

    #[test]
    fn keeps_terminal_schwa_for_america() {
        if !espeak_available() {
            return;
        }
        let vocab: HashMap<char, i64> = "əˈmɛɹɪkæ".chars().zip(1..).collect();
        let ids = phonemize("America", "en-us", &vocab, &EspeakConfig::default()).unwrap();
        assert_eq!(ids.last(), vocab.get(&'ə'));
    }
}
