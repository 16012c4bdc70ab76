//! Integrationstest für das Beispiel `evaluate.rs` gegen das gemeinsame Fixture.

use assert_cmd::Command;
use predicates::prelude::*;

const FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../tests/fixtures/features/basic.json"
);

fn example() -> Command {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "--quiet", "--package", "heimflag-eval", "--example", "evaluate", "--", FIXTURE]);
    cmd
}

#[test]
fn example_evaluates_every_feature_in_key_order() {
    let output = example().assert().success().get_output().stdout.clone();
    let out = String::from_utf8_lossy(&output);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(
        lines,
        vec![
            "button-color\t\"green\"\tforce",
            "checkout\t\"B\"\texperiment",
            "dark-mode\ttrue\tforce",
            "max-items\t10\tdefaultValue",
            "new-nav\tfalse\tdefaultValue",
        ]
    );
}

#[test]
fn example_reports_unknown_features() {
    example()
        .arg("missing")
        .assert()
        .success()
        .stdout(predicate::str::contains("missing\tnull\tunknownFeature"));
}
