//! Property-based tests for the safety gate

use chartgate::safety::{CodeSafetyValidator, DENYLIST};
use proptest::prelude::*;

const VALID: &str = "import matplotlib.pyplot as plt\nplt.plot([1, 2, 3])\nplt.savefig(output_path)\n";

/// Any denylisted token anywhere in otherwise valid code is rejected, naming the token
#[test]
fn test_denylisted_token_always_rejected() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                proptest::sample::select(DENYLIST.to_vec()),
                "[a-z0-9 _=\\n]{0,40}",
                any::<bool>(),
                any::<prop::sample::Index>(),
            ),
            |(token, filler, uppercase, position)| {
                let token = if uppercase {
                    token.to_uppercase()
                } else {
                    token.to_string()
                };
                let lines: Vec<&str> = VALID.lines().collect();
                let at = position.index(lines.len() + 1);
                let mut code: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
                code.insert(at, format!("{}{}", filler, token));
                let code = code.join("\n");

                let verdict = CodeSafetyValidator::new().validate(&code);
                prop_assert!(!verdict.safe);
                prop_assert!(verdict.reason.starts_with("Code contains forbidden operation"));
                Ok(())
            },
        )
        .unwrap();
}

/// Code without a save call never passes, whatever else it contains
#[test]
fn test_missing_save_always_rejected() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&"[a-z0-9 ()\\[\\],.=\\n]{0,120}", |body| {
            prop_assume!(!body.contains("save"));
            let code = format!("import matplotlib.pyplot as plt\n{}", body);
            let verdict = CodeSafetyValidator::new().validate(&code);
            prop_assert!(!verdict.safe);
            Ok(())
        })
        .unwrap();
}
