//! Deterministisches Bucketing für Experimente und Rollouts.
//!
//! Alle Funktionen sind rein: gleiche Eingaben liefern auf jeder Plattform
//! und in jedem Prozess dasselbe Ergebnis. Grundlage ist FNV-1a (32 Bit)
//! über die UTF-8-Bytes der Eingabe.
//!
//! - Version 1: `fnv1a32(value + seed) % 1000 / 1000`
//! - Version 2: `fnv1a32(dezimal(fnv1a32(seed + value))) % 10000 / 10000`

#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
mod query;

use heimflag_core::{BucketRange, Filter, Namespace, DEFAULT_HASH_ATTRIBUTE};

pub use error::{BucketError, Result};
pub use query::query_string_override;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
/// Auflösung von Hash-Version 1.
const V1_BUCKETS: u32 = 1_000;
/// Auflösung von Hash-Version 2.
const V2_BUCKETS: u32 = 10_000;
/// Erlaubte Abweichung der Gewichtssumme von 1.
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;
/// Filter hashen ohne explizite Angabe mit Version 2.
const DEFAULT_FILTER_HASH_VERSION: u32 = 2;

/// FNV-1a, 32 Bit.
pub fn fnv1a32(input: &str) -> u32 {
    input
        .bytes()
        .fold(FNV_OFFSET_BASIS, |h, b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}

/// Bildet `(seed, value)` deterministisch auf einen Wert in `[0, 1)` ab.
///
/// Die Version wählt den Algorithmus; unbekannte Versionen sind ein Fehler.
pub fn hash(seed: &str, value: &str, version: u32) -> Result<f64> {
    match version {
        1 => {
            let n = fnv1a32(&format!("{value}{seed}")) % V1_BUCKETS;
            Ok(f64::from(n) / f64::from(V1_BUCKETS))
        }
        2 => {
            let inner = fnv1a32(&format!("{seed}{value}"));
            let n = fnv1a32(&inner.to_string()) % V2_BUCKETS;
            Ok(f64::from(n) / f64::from(V2_BUCKETS))
        }
        other => Err(BucketError::UnsupportedHashVersion(other)),
    }
}

/// Prüft, ob die Identität im Teilbereich des Namespace liegt.
///
/// Der Hash ist auf den Namen des Namespace bezogen, damit verschiedene
/// Namespaces unabhängig voneinander aufteilen.
pub fn in_namespace(hash_value: &str, namespace: &Namespace) -> bool {
    hash(&format!("__{}", namespace.id), hash_value, 1)
        .map(|n| namespace.range.contains(n))
        .unwrap_or(false)
}

pub fn equal_weights(num_variations: usize) -> Vec<f64> {
    if num_variations == 0 {
        return Vec::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let w = 1.0 / num_variations as f64;
    vec![w; num_variations]
}

fn valid_weights(weights: &[f64], num_variations: usize) -> bool {
    if weights.len() != num_variations || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return false;
    }
    let total: f64 = weights.iter().sum();
    (total - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
}

/// Berechnet die Bucket-Bereiche der Variationen.
///
/// Die Bereiche liegen lückenlos ab 0 in Index-Reihenfolge; ihre
/// Gesamtlänge ist `coverage`. Der Rest bis 1 bedeutet "nicht im
/// Experiment". Ungültige Gewichte (falsche Anzahl, negative Werte, Summe
/// nicht 1) werden durch gleiche Gewichte ersetzt.
pub fn bucket_ranges(
    num_variations: usize,
    coverage: f64,
    weights: Option<&[f64]>,
) -> Vec<BucketRange> {
    let coverage = if coverage.is_nan() {
        0.0
    } else {
        coverage.clamp(0.0, 1.0)
    };

    let weights = match weights {
        Some(w) if valid_weights(w, num_variations) => {
            // Auf exakt 1 normieren, damit die Summe der Längen `coverage` ist.
            let total: f64 = w.iter().sum();
            w.iter().map(|x| x / total).collect()
        }
        Some(w) => {
            tracing::warn!(
                weights = ?w,
                num_variations,
                "invalid experiment weights, falling back to equal weights"
            );
            equal_weights(num_variations)
        }
        None => equal_weights(num_variations),
    };

    let mut cumulative = 0.0;
    weights
        .iter()
        .map(|w| {
            let start = cumulative;
            cumulative += w * coverage;
            BucketRange::new(start, cumulative)
        })
        .collect()
}

/// Index des ersten Bereichs, der `n` enthält.
pub fn choose_variation(n: f64, ranges: &[BucketRange]) -> Option<usize> {
    ranges.iter().position(|r| r.contains(n))
}

/// Ob ein Rollout (Force-Regel mit `range` oder `coverage`) den Nutzer
/// einschließt. Ohne beides gilt jeder als eingeschlossen.
pub fn is_included_in_rollout(
    seed: &str,
    hash_value: &str,
    range: Option<&BucketRange>,
    coverage: Option<f64>,
    version: u32,
) -> bool {
    if range.is_none() && coverage.is_none() {
        return true;
    }
    if hash_value.is_empty() {
        return false;
    }
    let Ok(n) = hash(seed, hash_value, version) else {
        return false;
    };
    match (range, coverage) {
        (Some(range), _) => range.contains(n),
        (None, Some(coverage)) => n <= coverage,
        (None, None) => true,
    }
}

/// Ob einer der Filter den Nutzer ausschließt.
///
/// `attribute_value` liefert den Attributwert als String (leer = fehlt).
pub fn is_filtered_out(filters: &[Filter], attribute_value: impl Fn(&str) -> String) -> bool {
    filters.iter().any(|filter| {
        let value = attribute_value(filter.attribute.as_deref().unwrap_or(DEFAULT_HASH_ATTRIBUTE));
        if value.is_empty() {
            return true;
        }
        let version = filter.hash_version.unwrap_or(DEFAULT_FILTER_HASH_VERSION);
        match hash(&filter.seed, &value, version) {
            Ok(n) => !filter.ranges.iter().any(|r| r.contains(n)),
            Err(_) => true,
        }
    })
}
