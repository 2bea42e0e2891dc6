//! Script runner: one fragment in, one validated outcome out
//!
//! Execution model is best-effort and non-transactional: network calls made
//! by a fragment are not rolled back when it later fails. Everything printed
//! is captured and returned with either outcome so the model can debug its
//! own scripts. There is no wall-clock timeout; the engine operation budget
//! is the only bound on runaway fragments.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rhai::{Dynamic, Engine, Scope};
use tracing::debug;

use crate::config::{Credentials, SandboxLimits};
use crate::sandbox::capabilities::{self, BROWSER_USER_AGENT};
use crate::sandbox::sanitize::sanitize;

/// Binding a fragment must leave behind with the computed answer
pub const PAYLOAD_BINDING: &str = "submission_payload";
/// Binding a fragment must leave behind with the URL to post the answer to
pub const DEST_BINDING: &str = "submission_dest";

/// Symbols with no business inside a fragment. `print`/`debug` stay enabled
/// because their output is captured.
const DISABLED_SYMBOLS: &[&str] = &[
    "eval", "import", "export", "system", "process", "thread", "spawn", "File", "file",
];

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one fragment execution
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    /// The fragment completed and produced both required bindings
    Success {
        /// Sanitized submission payload
        payload: serde_json::Value,
        /// URL the payload should be posted to
        dest: String,
        /// Everything the fragment printed
        output: String,
    },
    /// The fragment faulted or broke the binding contract
    Failure {
        /// Fault trace or contract-violation description, for model
        /// self-correction on the next turn
        message: String,
        /// Everything printed before the failure
        output: String,
    },
}

/// Executes model-generated fragments against a restricted scope
pub struct ScriptRunner {
    credentials: Credentials,
    limits: SandboxLimits,
}

impl ScriptRunner {
    pub fn new(credentials: Credentials, limits: SandboxLimits) -> Self {
        Self {
            credentials,
            limits,
        }
    }

    /// Run one fragment to completion or fault.
    ///
    /// Blocking; callers inside the async loop dispatch through
    /// `spawn_blocking`. The scope is pre-populated with `my_email`,
    /// `my_secret` and `current_url` as constants plus the registered
    /// capability functions; that surface is everything the fragment gets.
    pub fn execute(&self, code: &str, current_url: &str) -> ScriptOutcome {
        let printed: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));

        let http = match reqwest::blocking::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                return ScriptOutcome::Failure {
                    message: format!("could not initialize the http capability: {e}"),
                    output: String::new(),
                }
            }
        };

        let mut engine = Engine::new();
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);
        for symbol in DISABLED_SYMBOLS {
            engine.disable_symbol(*symbol);
        }

        let print_buffer = printed.clone();
        engine.on_print(move |text| {
            let mut buffer = lock(&print_buffer);
            buffer.push_str(text);
            buffer.push('\n');
        });
        let debug_buffer = printed.clone();
        engine.on_debug(move |text, _source, _pos| {
            let mut buffer = lock(&debug_buffer);
            buffer.push_str(text);
            buffer.push('\n');
        });

        capabilities::register(&mut engine, http);

        let mut scope = Scope::new();
        scope.push_constant("my_email", self.credentials.email.clone());
        scope.push_constant("my_secret", self.credentials.secret.clone());
        scope.push_constant("current_url", current_url.to_string());

        debug!(code_len = code.len(), "executing fragment");

        match engine.run_with_scope(&mut scope, code) {
            Err(fault) => ScriptOutcome::Failure {
                message: format!("Runtime error:\n{fault}"),
                output: lock(&printed).clone(),
            },
            Ok(()) => self.collect_bindings(&scope, &printed),
        }
    }

    /// Probe the post-execution scope for the two required bindings.
    fn collect_bindings(&self, scope: &Scope<'_>, printed: &Arc<Mutex<String>>) -> ScriptOutcome {
        let output = lock(printed).clone();

        let Some(payload) = scope.get_value::<Dynamic>(PAYLOAD_BINDING) else {
            return ScriptOutcome::Failure {
                message: format!(
                    "Error: your script finished but did not define '{PAYLOAD_BINDING}'."
                ),
                output,
            };
        };
        let Some(dest) = scope.get_value::<String>(DEST_BINDING) else {
            return ScriptOutcome::Failure {
                message: format!(
                    "Error: your script finished but did not define '{DEST_BINDING}' \
                     (the URL to post to)."
                ),
                output,
            };
        };

        ScriptOutcome::Success {
            payload: sanitize(&payload),
            dest,
            output,
        }
    }
}

fn lock(buffer: &Arc<Mutex<String>>) -> std::sync::MutexGuard<'_, String> {
    match buffer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runner() -> ScriptRunner {
        ScriptRunner::new(
            Credentials {
                email: "user@example.com".to_string(),
                secret: "s3cret".to_string(),
            },
            SandboxLimits::default(),
        )
    }

    #[test]
    fn test_success_with_both_bindings() {
        let outcome = runner().execute(
            r#"
                let submission_payload = #{ answer: 21 * 2, who: my_email };
                let submission_dest = "https://example.com/submit";
            "#,
            "https://example.com/quiz",
        );
        match outcome {
            ScriptOutcome::Success {
                payload,
                dest,
                output,
            } => {
                assert_eq!(
                    payload,
                    json!({"answer": 42, "who": "user@example.com"})
                );
                assert_eq!(dest, "https://example.com/submit");
                assert!(output.is_empty());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dest_names_the_binding() {
        let outcome = runner().execute(
            "let submission_payload = #{ answer: 1 };",
            "https://example.com/quiz",
        );
        match outcome {
            ScriptOutcome::Failure { message, .. } => {
                assert!(message.contains("submission_dest"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_payload_names_the_binding() {
        let outcome = runner().execute(
            r#"let submission_dest = "https://example.com/submit";"#,
            "https://example.com/quiz",
        );
        match outcome {
            ScriptOutcome::Failure { message, .. } => {
                assert!(message.contains("submission_payload"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_fault_keeps_earlier_prints() {
        let outcome = runner().execute(
            r#"
                print("step one");
                throw "boom";
            "#,
            "https://example.com/quiz",
        );
        match outcome {
            ScriptOutcome::Failure { message, output } => {
                assert!(message.contains("boom"));
                assert!(output.contains("step one"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_print_output_captured_on_success() {
        let outcome = runner().execute(
            r#"
                print("computing");
                print(40 + 2);
                let submission_payload = 42;
                let submission_dest = "https://example.com/submit";
            "#,
            "https://example.com/quiz",
        );
        match outcome {
            ScriptOutcome::Success { output, .. } => {
                assert_eq!(output, "computing\n42\n");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_current_url_is_visible() {
        let outcome = runner().execute(
            r#"
                let submission_payload = current_url;
                let submission_dest = current_url;
            "#,
            "https://example.com/quiz/7",
        );
        match outcome {
            ScriptOutcome::Success { payload, dest, .. } => {
                assert_eq!(payload, json!("https://example.com/quiz/7"));
                assert_eq!(dest, "https://example.com/quiz/7");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_symbols_are_rejected() {
        let outcome = runner().execute(
            r#"
                let submission_payload = eval("1 + 1");
                let submission_dest = "https://example.com/submit";
            "#,
            "https://example.com/quiz",
        );
        assert!(matches!(outcome, ScriptOutcome::Failure { .. }));
    }

    #[test]
    fn test_operation_budget_stops_runaway_loops() {
        let mut limits = SandboxLimits::default();
        limits.max_operations = 1_000;
        let runner = ScriptRunner::new(
            Credentials {
                email: "user@example.com".to_string(),
                secret: "s3cret".to_string(),
            },
            limits,
        );
        let outcome = runner.execute("loop { }", "https://example.com/quiz");
        assert!(matches!(outcome, ScriptOutcome::Failure { .. }));
    }
}
