//! Text rendering utilities for human-friendly diagnostics.
//!
//! Provides helpers to format construction chains, type names,
//! and suggestions in error output.

/// Renders a construction chain as a readable string.
///
/// # Examples
/// ```
/// use tessera_support::rendering::render_chain;
///
/// let chain = vec!["orderService", "paymentGateway", "orderService"];
/// assert_eq!(render_chain(&chain), "orderService → paymentGateway → orderService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders a construction chain one component per line, annotated with
/// the scope of each component and the injection style that reached it.
///
/// ```text
/// [Singleton] orderService
///       ↓ constructor
/// [Transient] paymentGateway
/// ```
pub fn render_chain_vertical(entries: &[ChainEntry]) -> String {
    let width = entries.iter().map(|e| e.scope.len()).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(entries.len() * 2);

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            let arrow = match entry.reached_via.as_deref() {
                Some(style) => format!("{}↓ {style}", " ".repeat(width + 3)),
                None => format!("{}↓", " ".repeat(width + 3)),
            };
            lines.push(arrow);
        }
        lines.push(format!("[{:<width$}] {}", entry.scope, entry.component));
    }

    lines.join("\n")
}

/// One component in a construction chain, for vertical rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    /// Component name
    pub component: String,
    /// Scope label (e.g. "Singleton")
    pub scope: String,
    /// How the previous component reached this one (e.g. "field `repo`")
    pub reached_via: Option<String>,
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use tessera_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("shop::billing::Invoice"), "Invoice");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn shop::cache::Cache>"),
///     "Arc<dyn Cache>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Levenshtein distance between two strings, counted in chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Suggests registered names close to a name that was not found.
///
/// Case-insensitive substring matches rank first, then names within an
/// edit distance of a third of the requested length (at least 2).
pub fn suggest_similar<'a>(
    requested: &str,
    available: impl IntoIterator<Item = &'a str>,
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let budget = (requested.chars().count() / 3).max(2);

    let mut scored: Vec<(usize, &str)> = available
        .into_iter()
        .filter(|name| *name != requested)
        .filter_map(|name| {
            let lower = name.to_lowercase();
            if lower.contains(&requested_lower) || requested_lower.contains(&lower) {
                return Some((0, name));
            }
            let distance = edit_distance(&requested_lower, &lower);
            (distance <= budget).then_some((distance, name))
        })
        .collect();

    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(_, name)| name.to_string())
        .collect()
}
