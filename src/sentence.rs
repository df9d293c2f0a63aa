//! Natural-language rendering of located objects.

use crate::locate::{LocatedObject, Location};

/// Output language. Unknown codes fall back to English.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    English,
    Turkish,
}

impl Language {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "tr" | "tr-tr" | "turkish" => Language::Turkish,
            _ => Language::English,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Turkish => "tr",
        }
    }

    fn nothing_visible(&self) -> &'static str {
        match self {
            Language::English => "I can't see anything clearly.",
            Language::Turkish => "Net bir şey göremiyorum.",
        }
    }

    fn location_phrase(&self, location: Location) -> &'static str {
        match (self, location) {
            (Language::English, Location::Left) => "on your left",
            (Language::English, Location::Center) => "in front of you",
            (Language::English, Location::Right) => "on your right",
            (Language::Turkish, Location::Left) => "solunuzda",
            (Language::Turkish, Location::Center) => "önünüzde",
            (Language::Turkish, Location::Right) => "sağınızda",
        }
    }
}

/// Render one sentence describing `objects` in order.
///
/// Never empty and never contains control characters.
pub fn render(objects: &[LocatedObject], language: Language) -> String {
    if objects.is_empty() {
        return language.nothing_visible().to_string();
    }

    match language {
        Language::English => {
            let fragments: Vec<String> = objects
                .iter()
                .map(|obj| {
                    let noun = clean_label(&obj.label);
                    format!(
                        "{} {} {}",
                        english_article(&noun),
                        noun,
                        language.location_phrase(obj.location)
                    )
                })
                .collect();
            format!("I see {}.", join_with(&fragments, ", ", " and "))
        }
        Language::Turkish => {
            let fragments: Vec<String> = objects
                .iter()
                .map(|obj| {
                    format!(
                        "{} bir {}",
                        language.location_phrase(obj.location),
                        clean_label(&obj.label)
                    )
                })
                .collect();
            let body = if fragments.len() == 1 {
                format!("{} var.", fragments[0])
            } else {
                format!("{} görüyorum.", join_with(&fragments, ", ", " ve "))
            };
            capitalize_first(&body)
        }
    }
}

fn join_with(items: &[String], separator: &str, last_separator: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{}{}{}", head.join(separator), last_separator, last),
    }
}

fn clean_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        "object".to_string()
    } else {
        cleaned
    }
}

fn english_article(noun: &str) -> &'static str {
    match noun.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
