use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use whatlang::{Detector, Lang};

/// Languages the search pipeline can tag a query with, serialized as ISO-639-3 codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
	#[serde(rename = "eng")]
	English,
	#[serde(rename = "fra")]
	French,
	#[serde(rename = "spa")]
	Spanish,
	#[serde(rename = "deu")]
	German,
	#[serde(rename = "ita")]
	Italian,
	#[serde(rename = "por")]
	Portuguese,
}
impl Language {
	pub const ALL: [Self; 6] =
		[Self::English, Self::French, Self::Spanish, Self::German, Self::Italian, Self::Portuguese];

	pub fn code(self) -> &'static str {
		match self {
			Self::English => "eng",
			Self::French => "fra",
			Self::Spanish => "spa",
			Self::German => "deu",
			Self::Italian => "ita",
			Self::Portuguese => "por",
		}
	}

	pub fn from_code(code: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|lang| lang.code().eq_ignore_ascii_case(code.trim()))
	}

	fn from_whatlang(lang: Lang) -> Option<Self> {
		match lang {
			Lang::Eng => Some(Self::English),
			Lang::Fra => Some(Self::French),
			Lang::Spa => Some(Self::Spanish),
			Lang::Deu => Some(Self::German),
			Lang::Ita => Some(Self::Italian),
			Lang::Por => Some(Self::Portuguese),
			_ => None,
		}
	}

	fn to_whatlang(self) -> Lang {
		match self {
			Self::English => Lang::Eng,
			Self::French => Lang::Fra,
			Self::Spanish => Lang::Spa,
			Self::German => Lang::Deu,
			Self::Italian => Lang::Ita,
			Self::Portuguese => Lang::Por,
		}
	}
}

const MIN_LID_LETTERS: usize = 24;
const MIN_LID_CONFIDENCE: f64 = 0.5;

const FRENCH_HINTS: &[&str] = &[
	"le", "la", "les", "des", "du", "une", "qui", "quel", "quelle", "est", "dans", "avec", "pour",
	"chez", "et", "directeur", "directrice", "ingénieur", "responsable", "cherche", "trouve",
	"président",
];
const SPANISH_HINTS: &[&str] = &[
	"el", "los", "las", "una", "quién", "quien", "qué", "dónde", "donde", "es", "con", "para",
	"y", "gerente", "ingeniero", "desarrollador", "abogado", "busca", "encuentra", "jefe",
];
const ENGLISH_HINTS: &[&str] = &[
	"the", "who", "what", "where", "is", "with", "for", "and", "at", "of", "find", "show",
	"engineer", "manager", "director", "developer",
];

/// Detects the dominant language of a query.
///
/// Long, letter-dense text goes through statistical language identification. Short queries are
/// too noisy for that, so they fall back to stopword and diacritic hints. English is the default
/// when nothing is conclusive.
pub fn detect_language(text: &str) -> Language {
	let normalized: String = text.nfkc().collect::<String>().to_lowercase();

	if let Some(lang) = detect_statistical(&normalized) {
		return lang;
	}

	detect_by_hints(&normalized).unwrap_or(Language::English)
}

fn detect_statistical(text: &str) -> Option<Language> {
	let letters = text.chars().filter(|ch| ch.is_alphabetic()).count();

	if letters < MIN_LID_LETTERS {
		return None;
	}

	let detector =
		Detector::with_allowlist(Language::ALL.into_iter().map(Language::to_whatlang).collect());
	let info = detector.detect(text)?;

	if !info.is_reliable() || info.confidence() < MIN_LID_CONFIDENCE {
		return None;
	}

	Language::from_whatlang(info.lang())
}

fn detect_by_hints(text: &str) -> Option<Language> {
	let mut english = 0_usize;
	let mut french = 0_usize;
	let mut spanish = 0_usize;

	for ch in text.chars() {
		match ch {
			'ñ' | '¿' | '¡' => spanish += 2,
			'ç' | 'œ' | 'è' | 'ê' | 'à' | 'ù' | 'â' | 'î' | 'ô' => french += 2,
			_ => {},
		}
	}

	for token in text.split(|ch: char| !ch.is_alphanumeric()).filter(|token| !token.is_empty()) {
		if FRENCH_HINTS.contains(&token) {
			french += 1;
		}
		if SPANISH_HINTS.contains(&token) {
			spanish += 1;
		}
		if ENGLISH_HINTS.contains(&token) {
			english += 1;
		}
	}

	let best = english.max(french).max(spanish);

	if best == 0 {
		return None;
	}
	// Ties go to English, then French.
	if english == best {
		return Some(Language::English);
	}
	if french == best {
		return Some(Language::French);
	}

	Some(Language::Spanish)
}
