use heimflag_eval::{ContextBuilder, TracingWarnings};
use serde_json::json;
use std::error::Error;
use std::fs;

/// Usage: `evaluate <options.json> [feature...]`
///
/// Prints one `key<TAB>value<TAB>source` line per feature. Without explicit
/// keys every feature in the document is evaluated.
fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("missing options file")?;
    let json = fs::read_to_string(path)?;

    let ctx = ContextBuilder::from_json(&json, &mut TracingWarnings)?.build();

    let mut keys: Vec<String> = args.collect();
    if keys.is_empty() {
        keys = ctx.features().keys().cloned().collect();
        keys.sort();
    }

    for key in keys {
        let result = ctx.eval_feature(&key);
        println!(
            "{key}\t{}\t{}",
            result.value_or(json!(null)),
            result.source
        );
    }

    Ok(())
}
