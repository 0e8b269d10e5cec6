use std::{collections::HashMap, sync::LazyLock};

use crate::{language::Language, query_text::normalize_query};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticExpansion {
	pub key: &'static str,
	pub expansion: &'static str,
	pub language: Language,
}

/// A static table hit for a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticMatch {
	pub entry: &'static StaticExpansion,
	/// Token offset of the key inside the normalized query.
	pub position: usize,
	pub exact: bool,
}

const fn entry(key: &'static str, expansion: &'static str, language: Language) -> StaticExpansion {
	StaticExpansion { key, expansion, language }
}

/// Keys are stored normalized. Keys that collide with common words ("it", "sa", "md") are left out.
pub const STATIC_EXPANSIONS: &[StaticExpansion] = &[
	entry(
		"ceo",
		"chief executive officer president leader executive director founder",
		Language::English,
	),
	entry("cto", "chief technology officer technical director head of engineering", Language::English),
	entry("cfo", "chief financial officer finance director head of finance", Language::English),
	entry("coo", "chief operating officer operations director head of operations", Language::English),
	entry("cmo", "chief marketing officer marketing director head of marketing", Language::English),
	entry("cio", "chief information officer information technology director", Language::English),
	entry("cpo", "chief product officer head of product product director", Language::English),
	entry("ciso", "chief information security officer head of security", Language::English),
	entry("vp", "vice president executive senior leader", Language::English),
	entry("svp", "senior vice president executive leader", Language::English),
	entry("evp", "executive vice president executive leader", Language::English),
	entry("vp sales", "vice president of sales head of sales sales director", Language::English),
	entry(
		"vp engineering",
		"vice president of engineering head of engineering technical director",
		Language::English,
	),
	entry("gm", "general manager business unit leader", Language::English),
	entry("hr", "human resources people operations recruiting talent", Language::English),
	entry("pm", "product manager project manager", Language::English),
	entry("qa", "quality assurance tester test engineer", Language::English),
	entry("ux", "user experience designer product designer", Language::English),
	entry("ui", "user interface designer visual designer", Language::English),
	entry("bdr", "business development representative sales prospecting", Language::English),
	entry("sdr", "sales development representative sales prospecting", Language::English),
	entry("ae", "account executive sales representative", Language::English),
	entry("devops", "site reliability engineer infrastructure operations platform", Language::English),
	entry("sre", "site reliability engineer devops infrastructure", Language::English),
	entry(
		"engineer",
		"software developer technical programmer engineering specialist",
		Language::English,
	),
	entry("developer", "software engineer programmer technical coder", Language::English),
	entry("dev", "software developer engineer programmer technical", Language::English),
	entry("founder", "co-founder entrepreneur owner ceo startup", Language::English),
	entry("cofounder", "co-founder founder entrepreneur owner startup", Language::English),
	entry("investor", "venture capital angel partner vc funding", Language::English),
	entry("vc", "venture capital investor partner fund", Language::English),
	entry("recruiter", "talent acquisition hiring human resources sourcer", Language::English),
	entry("lawyer", "attorney legal counsel solicitor", Language::English),
	entry("accountant", "cpa finance bookkeeping audit", Language::English),
	entry("designer", "ux ui product designer graphic designer creative", Language::English),
	entry("data scientist", "machine learning analytics statistics ai", Language::English),
	entry("llc", "limited liability company", Language::English),
	entry("inc", "incorporated company corporation", Language::English),
	entry("ltd", "limited company", Language::English),
	entry("corp", "corporation company", Language::English),
	entry("pdg", "président directeur général ceo chief executive officer", Language::French),
	entry("dg", "directeur général general manager ceo", Language::French),
	entry("drh", "directeur des ressources humaines hr director human resources", Language::French),
	entry("daf", "directeur administratif et financier cfo finance director", Language::French),
	entry("ingénieur", "engineer développeur software developer technical", Language::French),
	entry("ingenieur", "engineer développeur software developer technical", Language::French),
	entry("développeur", "developer software engineer programmeur", Language::French),
	entry("avocat", "lawyer attorney legal counsel", Language::French),
	entry("comptable", "accountant finance bookkeeping", Language::French),
	entry("gerente", "manager director general manager", Language::Spanish),
	entry("ingeniero", "engineer software developer technical desarrollador", Language::Spanish),
	entry("desarrollador", "developer software engineer programador", Language::Spanish),
	entry("abogado", "lawyer attorney legal counsel", Language::Spanish),
	entry("contador", "accountant finance bookkeeping", Language::Spanish),
	entry("director ejecutivo", "ceo chief executive officer", Language::Spanish),
];

static INDEX: LazyLock<HashMap<&'static str, &'static StaticExpansion>> =
	LazyLock::new(|| STATIC_EXPANSIONS.iter().map(|entry| (entry.key, entry)).collect());

/// Looks the query up in the static expansion table.
///
/// An exact match on the normalized query wins. Otherwise every key is tried as a whole-token
/// run inside the query; the longest key wins, then the earliest position.
pub fn lookup(query: &str) -> Option<StaticMatch> {
	let normalized = normalize_query(query);

	if normalized.is_empty() {
		return None;
	}
	if let Some(entry) = INDEX.get(normalized.as_str()) {
		return Some(StaticMatch { entry, position: 0, exact: true });
	}

	let tokens: Vec<&str> = normalized.split(' ').collect();
	let mut best: Option<StaticMatch> = None;

	for entry in STATIC_EXPANSIONS {
		let Some(position) = find_token_run(&tokens, entry.key) else {
			continue;
		};
		let better = match best {
			None => true,
			Some(current) =>
				entry.key.len() > current.entry.key.len()
					|| (entry.key.len() == current.entry.key.len()
						&& position < current.position),
		};

		if better {
			best = Some(StaticMatch { entry, position, exact: false });
		}
	}

	best
}

/// Builds the enhanced query for a static hit: the original query followed by the expansion.
pub fn expand(query: &str, entry: &StaticExpansion) -> String {
	format!("{} {}", query.trim(), entry.expansion)
}

fn find_token_run(tokens: &[&str], key: &str) -> Option<usize> {
	let key_tokens: Vec<&str> = key.split(' ').collect();

	if key_tokens.len() > tokens.len() {
		return None;
	}

	tokens.windows(key_tokens.len()).position(|window| window == key_tokens.as_slice())
}
