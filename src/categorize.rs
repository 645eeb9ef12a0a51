//! Rule-based issue categorization.
//!
//! Assigns one or more categories to an issue from its title and body using
//! weighted keyword tables, and produces the category-prefixed text that is
//! fed to the embedder. Prefixing implicitly partitions the embedding space
//! by category, biasing neighbor search toward same-category matches.
//!
//! Categorization is a pure function over a static table: it never fails,
//! and empty input falls back to the `general` category.

use regex::RegexBuilder;
use std::collections::BTreeMap;

/// Fixed category set. `General` is the guaranteed fallback when no
/// keyword scores above zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Bug,
    Feature,
    Documentation,
    Security,
    Performance,
    Question,
    Dependency,
    Testing,
    Refactor,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bug => "bug",
            Category::Feature => "feature",
            Category::Documentation => "documentation",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Question => "question",
            Category::Dependency => "dependency",
            Category::Testing => "testing",
            Category::Refactor => "refactor",
            Category::General => "general",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword table: category, keyword phrases, weight. Weight reflects domain
/// priority: security issues are boosted, questions and refactors damped.
const CATEGORY_TABLE: &[(Category, &[&str], f64)] = &[
    (
        Category::Bug,
        &[
            "bug", "error", "issue", "problem", "broken", "crash", "fail",
            "exception", "not working", "doesn't work", "incorrect", "wrong",
            "unexpected", "regression", "defect", "fault",
        ],
        1.0,
    ),
    (
        Category::Feature,
        &[
            "feature", "enhancement", "add", "implement", "support", "new",
            "request", "proposal", "improvement", "would like", "could we",
            "ability to", "allow", "enable",
        ],
        1.0,
    ),
    (
        Category::Documentation,
        &[
            "docs", "documentation", "readme", "guide", "tutorial", "example",
            "comment", "typo", "spelling", "grammar", "clarify", "explain",
        ],
        0.9,
    ),
    (
        Category::Security,
        &[
            "security", "vulnerability", "exploit", "xss", "sql injection",
            "csrf", "authentication", "authorization", "cve", "sensitive",
            "leak", "exposure", "unsafe",
        ],
        1.2,
    ),
    (
        Category::Performance,
        &[
            "performance", "slow", "speed", "optimize", "memory", "cpu",
            "lag", "latency", "bottleneck", "efficiency", "faster", "cache",
        ],
        1.0,
    ),
    (
        Category::Question,
        &[
            "question", "how to", "how do i", "help", "what is", "why",
            "when", "where", "which", "clarification", "confused", "understand",
        ],
        0.8,
    ),
    (
        Category::Dependency,
        &[
            "dependency", "dependencies", "package", "npm", "pip", "yarn",
            "upgrade", "update", "version", "outdated", "deprecat",
        ],
        0.9,
    ),
    (
        Category::Testing,
        &[
            "test", "testing", "unit test", "integration test", "e2e",
            "coverage", "mock", "fixture", "assertion", "spec",
        ],
        0.9,
    ),
    (
        Category::Refactor,
        &[
            "refactor", "cleanup", "clean up", "reorganize", "restructure",
            "simplify", "improve code", "code quality", "technical debt",
        ],
        0.8,
    ),
];

/// Multi-label significance threshold: secondary categories must score at
/// least this fraction of the top score to be kept.
const SECONDARY_THRESHOLD: f64 = 0.3;

/// Result of categorizing one issue.
#[derive(Debug, Clone)]
pub struct Categorization {
    pub primary: Category,
    /// Primary plus all secondaries within [`SECONDARY_THRESHOLD`] of it,
    /// highest score first.
    pub categories: Vec<Category>,
    /// In [0, 1]. Deliberately asymptotic: a category that dominates its
    /// competitors still never reaches 1.0.
    pub confidence: f64,
    /// Raw per-category scores, rounded to 2 decimals. Empty on fallback.
    pub scores: BTreeMap<&'static str, f64>,
}

struct CategoryMatcher {
    category: Category,
    pattern: regex::Regex,
    weight: f64,
}

/// Rule-based multi-label classifier over issue text.
pub struct Categorizer {
    matchers: Vec<CategoryMatcher>,
}

impl Categorizer {
    pub fn new() -> Self {
        let matchers = CATEGORY_TABLE
            .iter()
            .map(|(category, keywords, weight)| {
                let alternation = keywords
                    .iter()
                    .map(|kw| regex::escape(kw))
                    .collect::<Vec<_>>()
                    .join("|");
                // Whole-word match; keyword tables are static so the
                // pattern is known valid.
                let pattern = RegexBuilder::new(&format!(r"\b({alternation})\b"))
                    .case_insensitive(true)
                    .build()
                    .expect("static category pattern");
                CategoryMatcher {
                    category: *category,
                    pattern,
                    weight: *weight,
                }
            })
            .collect();
        Self { matchers }
    }

    /// Categorize an issue from its title and body.
    ///
    /// Score per category = whole-word match count × category weight. When
    /// nothing matches, returns the `general` fallback with confidence 0.5
    /// and an empty score map.
    pub fn categorize(&self, title: &str, body: &str) -> Categorization {
        let text = format!("{title} {body}");

        let mut scored: Vec<(Category, f64)> = Vec::new();
        for matcher in &self.matchers {
            let matches = matcher.pattern.find_iter(&text).count();
            let score = matches as f64 * matcher.weight;
            if score > 0.0 {
                scored.push((matcher.category, score));
            }
        }

        if scored.is_empty() {
            return Categorization {
                primary: Category::General,
                categories: vec![Category::General],
                confidence: 0.5,
                scores: BTreeMap::new(),
            };
        }

        // Stable sort keeps table order on ties.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (primary, top_score) = scored[0];
        let threshold = top_score * SECONDARY_THRESHOLD;
        let categories: Vec<Category> = scored
            .iter()
            .filter(|(_, score)| *score >= threshold)
            .map(|(category, _)| *category)
            .collect();

        let total: f64 = scored.iter().map(|(_, score)| score).sum();
        let confidence = round2((top_score / (total + 1.0)).min(1.0));

        let scores = scored
            .iter()
            .map(|(category, score)| (category.as_str(), round2(*score)))
            .collect();

        Categorization {
            primary,
            categories,
            confidence,
            scores,
        }
    }

    /// Prefix raw issue text with a bracketed uppercase category tag.
    ///
    /// This enhanced string, not the raw title/body, is what gets embedded.
    pub fn enhance_text(&self, title: &str, body: &str, category: Category) -> String {
        format!("[{}] {title}\n{body}", category.as_str().to_uppercase())
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_falls_back_to_general() {
        let c = Categorizer::new();
        let result = c.categorize("", "");
        assert_eq!(result.primary, Category::General);
        assert_eq!(result.categories, vec![Category::General]);
        assert_eq!(result.confidence, 0.5);
        assert!(result.scores.is_empty());
    }

    #[test]
    fn test_no_keyword_text_falls_back_to_general() {
        let c = Categorizer::new();
        let result = c.categorize("lorem ipsum dolor", "sit amet");
        assert_eq!(result.primary, Category::General);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_bug_keywords_win() {
        let c = Categorizer::new();
        let result = c.categorize("Crash on startup", "Stack trace shows an error and exception");
        assert_eq!(result.primary, Category::Bug);
        assert!(result.scores.contains_key("bug"));
    }

    #[test]
    fn test_security_outweighs_bug_on_equal_matches() {
        let c = Categorizer::new();
        // One bug keyword (1.0) vs one security keyword (1.2).
        let result = c.categorize("error in authentication", "");
        assert_eq!(result.primary, Category::Security);
    }

    #[test]
    fn test_secondary_categories_preserved() {
        let c = Categorizer::new();
        let result = c.categorize(
            "Bug: slow performance and memory error",
            "The crash happens under load, optimize the cache",
        );
        assert!(result.categories.len() > 1);
        assert!(result.categories.contains(&result.primary));
    }

    #[test]
    fn test_confidence_always_in_unit_interval() {
        let c = Categorizer::new();
        for (title, body) in [
            ("", ""),
            ("bug bug bug bug bug", "bug bug bug"),
            ("add feature", "error crash"),
            ("security vulnerability exploit cve", ""),
        ] {
            let result = c.categorize(title, body);
            assert!(
                (0.0..=1.0).contains(&result.confidence),
                "confidence out of range for {title:?}: {}",
                result.confidence
            );
        }
    }

    #[test]
    fn test_confidence_never_reaches_one() {
        let c = Categorizer::new();
        let result = c.categorize("bug bug bug bug bug bug bug bug", "");
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn test_matching_is_whole_word() {
        let c = Categorizer::new();
        // "bugle" must not match the "bug" keyword.
        let result = c.categorize("bugle practice schedule", "");
        assert_eq!(result.primary, Category::General);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let c = Categorizer::new();
        let result = c.categorize("CRASH ON LOGIN", "ERROR everywhere");
        assert_eq!(result.primary, Category::Bug);
    }

    #[test]
    fn test_phrase_keywords_match() {
        let c = Categorizer::new();
        let result = c.categorize("how do i configure the thing", "");
        assert_eq!(result.primary, Category::Question);
    }

    #[test]
    fn test_enhance_text_format() {
        let c = Categorizer::new();
        let enhanced = c.enhance_text("App crashes", "on login", Category::Bug);
        assert_eq!(enhanced, "[BUG] App crashes\non login");
    }
}
