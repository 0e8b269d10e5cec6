use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

pub const MAX_QUERY_TAGS: usize = 8;

const INTERROGATIVES: &[&str] = &[
	"who", "what", "where", "which", "when", "how", "whose", "whom", "qui", "quel", "quelle",
	"quels", "quelles", "où", "quién", "quien", "quiénes", "qué", "que", "dónde", "donde", "cuál",
	"cual",
];

const STOPWORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "of", "on", "or",
	"the", "to", "with", "who", "what", "where", "which", "me", "my", "our", "all", "any", "some",
	"le", "la", "les", "de", "des", "du", "un", "une", "et", "ou", "en", "dans", "pour", "avec",
	"qui", "est", "el", "los", "las", "una", "y", "con", "para", "por", "es", "que",
];

static COMMAND_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(
		r"(?ix)
		^\s*
		(?:please\s+)?
		(?:
			search\s+for | show\s+me | show | look\s+for | find\s+me | find
			| get\s+me | list\s+(?:all|the) | give\s+me
			| i\s+need | i\s+want | i['’]?m\s+looking\s+for | i\s+am\s+looking\s+for | looking\s+for
			| trouve[sz]?(?:[-\s]moi)? | cherche[sz]?
			| busca(?:me)? | encuentra(?:me)?
		)
		\s+
		(?:(?:all|the|a|an|les|la|le|des|los|las|el)\s+){0,2}
		",
	)
	.expect("Command prefix pattern must compile.")
});

/// Normalizes a query for cache lookups: NFKC, lowercase, punctuation folded to spaces, and
/// whitespace collapsed. `&`, `+`, and `#` survive so "c++" and "r&d" stay distinct.
pub fn normalize_query(query: &str) -> String {
	let folded: String = query
		.nfkc()
		.flat_map(char::to_lowercase)
		.map(|ch| if ch.is_alphanumeric() || matches!(ch, '&' | '+' | '#') { ch } else { ' ' })
		.collect();

	folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text the shared cache key is hashed from. Unlike `normalize_query`, symbols and emoji are
/// kept; only ASCII punctuation other than `&+#` folds away. A query made only of folded
/// characters keeps its NFKC lowercase form so distinct queries never share a key.
pub fn cache_key_text(query: &str) -> String {
	let folded: String = query
		.nfkc()
		.flat_map(char::to_lowercase)
		.map(|ch| {
			if ch.is_ascii_punctuation() && !matches!(ch, '&' | '+' | '#') { ' ' } else { ch }
		})
		.collect();
	let key = folded.split_whitespace().collect::<Vec<_>>().join(" ");

	if !key.is_empty() {
		return key;
	}

	let lossless: String = query.nfkc().flat_map(char::to_lowercase).collect();

	lossless.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_interrogative(query: &str) -> bool {
	let Some(first) = query.split_whitespace().next() else {
		return false;
	};
	let first = first.trim_start_matches(['¿', '¡']).trim_end_matches(['?', ',', ':']);

	INTERROGATIVES.iter().any(|word| first.to_lowercase() == *word)
}

/// Strips a leading command phrase ("find", "show me all", "busca") before reranking.
///
/// Questions are returned unchanged. When stripping would leave nothing, the trimmed input is
/// returned.
pub fn preprocess_for_rerank(query: &str) -> String {
	let trimmed = query.trim();

	if is_interrogative(trimmed) {
		return trimmed.to_string();
	}

	let stripped = COMMAND_PREFIX.replace(trimmed, "");
	let stripped = stripped.trim();

	if stripped.is_empty() { trimmed.to_string() } else { stripped.to_string() }
}

/// Lowercase content words of `text` in first-seen order, at least two characters long.
pub fn query_tags(text: &str, max: usize) -> Vec<String> {
	let mut tags: Vec<String> = Vec::new();

	for word in text.unicode_words() {
		if tags.len() >= max {
			break;
		}

		let word = word.to_lowercase();

		if word.chars().count() < 2 || STOPWORDS.contains(&word.as_str()) {
			continue;
		}
		if !tags.contains(&word) {
			tags.push(word);
		}
	}

	tags
}

#[cfg(test)]
mod tests {
	use crate::query_text::{
		MAX_QUERY_TAGS, cache_key_text, is_interrogative, normalize_query, preprocess_for_rerank,
		query_tags,
	};

	#[test]
	fn normalize_folds_case_punctuation_and_whitespace() {
		assert_eq!(normalize_query("  Senior   CEO!! "), "senior ceo");
		assert_eq!(normalize_query("C++ / R&D"), "c++ r&d");
		assert_eq!(normalize_query("ＣＥＯ"), "ceo");
		assert_eq!(normalize_query("Ingénieur"), "ingénieur");
		assert_eq!(normalize_query("?!"), "");
	}

	#[test]
	fn cache_key_text_keeps_symbols_and_emoji() {
		assert_eq!(cache_key_text("  Senior   CEO!! "), "senior ceo");
		assert_eq!(cache_key_text("C++ / R&D"), "c++ r&d");
		assert_eq!(cache_key_text("🚀"), "🚀");
		assert_eq!(cache_key_text("c# 🚀"), "c# 🚀");
		assert_eq!(cache_key_text("¿?"), "¿");
		assert_eq!(cache_key_text("$$$"), "$$$");
		assert_eq!(cache_key_text("?!"), "?!");
		assert_eq!(cache_key_text("\0"), "\0");

		let keys = ["🚀", "💼", "¿?", "$$$", "\0", "?!", "!?"].map(cache_key_text);

		for (index, key) in keys.iter().enumerate() {
			assert!(!key.is_empty());
			assert!(!keys[index + 1..].contains(key), "{key:?} collides");
		}
	}

	#[test]
	fn strips_command_prefixes() {
		assert_eq!(preprocess_for_rerank("find CEO"), "CEO");
		assert_eq!(preprocess_for_rerank("Show me all the engineers"), "engineers");
		assert_eq!(preprocess_for_rerank("search for designers in Paris"), "designers in Paris");
		assert_eq!(preprocess_for_rerank("I'm looking for a lawyer"), "lawyer");
		assert_eq!(preprocess_for_rerank("cherche les ingénieurs"), "ingénieurs");
		assert_eq!(preprocess_for_rerank("busca abogados"), "abogados");
	}

	#[test]
	fn keeps_questions_and_plain_queries() {
		assert_eq!(preprocess_for_rerank("who works at Acme?"), "who works at Acme?");
		assert_eq!(preprocess_for_rerank("¿Quién es el gerente?"), "¿Quién es el gerente?");
		assert_eq!(preprocess_for_rerank("marketing director"), "marketing director");
		assert!(is_interrogative("Where is Bob"));
		assert!(!is_interrogative("finder tools"));
	}

	#[test]
	fn bare_search_words_are_content() {
		assert_eq!(preprocess_for_rerank("search engine expert"), "search engine expert");
		assert_eq!(preprocess_for_rerank("get rich founders"), "get rich founders");
		assert_eq!(preprocess_for_rerank("list manager"), "list manager");
		assert_eq!(preprocess_for_rerank("list all engineers"), "engineers");
	}

	#[test]
	fn never_strips_to_empty() {
		assert_eq!(preprocess_for_rerank("find"), "find");
		assert_eq!(preprocess_for_rerank("  busca "), "busca");
		assert_eq!(preprocess_for_rerank("finder"), "finder");
	}

	#[test]
	fn tags_drop_stopwords_and_duplicates() {
		let tags = query_tags("the CEO of Acme and the ceo of Globex", MAX_QUERY_TAGS);

		assert_eq!(tags, vec!["ceo", "acme", "globex"]);
	}

	#[test]
	fn tags_are_capped() {
		let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";

		assert_eq!(query_tags(text, MAX_QUERY_TAGS).len(), MAX_QUERY_TAGS);
	}
}
