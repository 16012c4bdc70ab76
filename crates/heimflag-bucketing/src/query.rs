//! Erzwungene Variationen über die URL-Query (`?mein-experiment=1`).

use url::Url;

/// Basis zum Auflösen relativer URLs wie `/pricing?exp=1`.
const RELATIVE_BASE: &str = "http://localhost/";

/// Liest den erzwungenen Variationsindex für `id` aus der Query der `url`.
///
/// Nur nicht-negative Ganzzahlen kleiner `num_variations` zählen; alles
/// andere wird ignoriert.
pub fn query_string_override(id: &str, url: &str, num_variations: usize) -> Option<usize> {
    if url.trim().is_empty() {
        return None;
    }
    let parsed = Url::parse(url)
        .or_else(|_| Url::parse(RELATIVE_BASE).and_then(|base| base.join(url)))
        .ok()?;

    let (_, raw) = parsed.query_pairs().find(|(name, _)| name == id)?;
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let variation: usize = raw.parse().ok()?;
    (variation < num_variations).then_some(variation)
}
