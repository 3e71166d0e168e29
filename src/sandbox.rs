//! Script Sandbox: a fresh `rhai` interpreter per invocation with a
//! capability-restricted host API.
//!
//! `rhai` has no built-in filesystem, network, OS, or subprocess
//! access, so the default `Engine` is already unreachable from those
//! surfaces; the host only adds the three callbacks a rule script is
//! allowed to call. Because `rhai`'s registered functions are
//! synchronous, the callbacks buffer their effect into a shared list
//! instead of publishing directly; the Rule Executor drains that list
//! after `eval` returns. This gives each host callback a capability
//! object without requiring an async-aware scripting engine.

use crate::error::{EngineError, Result};
use crate::model::Message;
use rhai::{Array, Dynamic, Engine, Scope};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A side effect a script requested via one of the host callbacks.
#[derive(Debug, Clone)]
pub enum SandboxEffect {
    SendEmail {
        to: Vec<String>,
        subject: String,
        body: String,
    },
    SaveSenml {
        payload: String,
    },
    SendAlarm {
        payload: String,
    },
}

/// Outcome of one script evaluation: the final-expression value
/// (string form, `None` if unit/empty) plus any buffered effects, in
/// call order.
#[derive(Debug, Default)]
pub struct SandboxOutcome {
    pub result: Option<String>,
    pub effects: Vec<SandboxEffect>,
}

/// Script Sandbox. Stateless between invocations: `eval` builds a
/// fresh `Engine` and `Scope` every call, so no mutable state survives
/// across rule executions.
pub struct Sandbox {
    timeout: Duration,
}

impl Sandbox {
    pub fn new(timeout: Duration) -> Self {
        Sandbox { timeout }
    }

    /// Evaluate `script` with `message` bound as the `message` global.
    /// Host callbacks append to a shared effect buffer rather than
    /// acting synchronously; see module docs.
    pub fn eval(&self, message: &Message, script: &str) -> Result<SandboxOutcome> {
        let mut engine = Engine::new();
        let effects: Arc<Mutex<Vec<SandboxEffect>>> = Arc::new(Mutex::new(Vec::new()));

        let email_effects = effects.clone();
        engine.register_fn(
            "send_email",
            move |to: Array, subject: &str, body: &str| {
                let to: Vec<String> = to
                    .into_iter()
                    .map(|d| d.into_string().unwrap_or_default())
                    .collect();
                email_effects
                    .lock()
                    .expect("sandbox effect lock poisoned")
                    .push(SandboxEffect::SendEmail {
                        to,
                        subject: subject.to_string(),
                        body: body.to_string(),
                    });
            },
        );

        let senml_effects = effects.clone();
        engine.register_fn("save_senml", move |payload: &str| {
            senml_effects
                .lock()
                .expect("sandbox effect lock poisoned")
                .push(SandboxEffect::SaveSenml {
                    payload: payload.to_string(),
                });
        });

        let alarm_effects = effects.clone();
        engine.register_fn("send_alarm", move |payload: &str| {
            alarm_effects
                .lock()
                .expect("sandbox effect lock poisoned")
                .push(SandboxEffect::SendAlarm {
                    payload: payload.to_string(),
                });
        });

        let start = Instant::now();
        let timeout = self.timeout;
        engine.on_progress(move |_ops| {
            if start.elapsed() > timeout {
                Some(Dynamic::from("script evaluation timed out"))
            } else {
                None
            }
        });

        let mut scope = Scope::new();
        scope.push("message", message_to_dynamic(message));

        let value: Dynamic = engine
            .eval_with_scope(&mut scope, script)
            .map_err(EngineError::from)?;

        let result = if value.is_unit() {
            None
        } else {
            Some(dynamic_to_display(&value))
        };

        let effects = effects
            .lock()
            .expect("sandbox effect lock poisoned")
            .clone();

        Ok(SandboxOutcome { result, effects })
    }
}

fn message_to_dynamic(message: &Message) -> Dynamic {
    let mut map = rhai::Map::new();
    map.insert("publisher".into(), message.publisher.clone().into());
    map.insert("channel".into(), message.channel.clone().into());
    map.insert("subtopic".into(), message.subtopic.clone().into());
    map.insert(
        "payload".into(),
        String::from_utf8_lossy(&message.payload).into_owned().into(),
    );
    map.insert("created".into(), (message.created as i64).into());
    map.insert("domain".into(), message.domain.clone().into());
    map.insert("protocol".into(), message.protocol.clone().into());
    if let Some(metadata) = &message.metadata {
        let mut meta_map = rhai::Map::new();
        for (k, v) in metadata {
            meta_map.insert(k.as_str().into(), json_value_to_dynamic(v));
        }
        map.insert("metadata".into(), meta_map.into());
    }
    map.into()
}

fn json_value_to_dynamic(value: &serde_json::Value) -> Dynamic {
    match value {
        serde_json::Value::Null => Dynamic::UNIT,
        serde_json::Value::Bool(b) => (*b).into(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Dynamic::from)
            .unwrap_or_else(|| n.as_f64().unwrap_or(0.0).into()),
        serde_json::Value::String(s) => s.clone().into(),
        serde_json::Value::Array(items) => {
            let arr: Array = items.iter().map(json_value_to_dynamic).collect();
            arr.into()
        }
        serde_json::Value::Object(obj) => {
            let mut map = rhai::Map::new();
            for (k, v) in obj {
                map.insert(k.as_str().into(), json_value_to_dynamic(v));
            }
            map.into()
        }
    }
}

/// String form used both for the published output payload and for
/// test assertions: rhai's own `Display` for floats/ints/strings.
fn dynamic_to_display(value: &Dynamic) -> String {
    match value.clone().into_string() {
        Ok(s) => s,
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> Message {
        Message {
            publisher: "dev1".to_string(),
            channel: "c1".to_string(),
            subtopic: String::new(),
            payload: b"raw".to_vec(),
            created: 1000,
            domain: "dom1".to_string(),
            protocol: "mqtt".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn returns_string_form_of_final_expression() {
        let sandbox = Sandbox::new(Duration::from_secs(1));
        let outcome = sandbox.eval(&msg(), "42").unwrap();
        assert_eq!(outcome.result.as_deref(), Some("42"));
        assert!(outcome.effects.is_empty());
    }

    #[test]
    fn unit_result_yields_no_output() {
        let sandbox = Sandbox::new(Duration::from_secs(1));
        let outcome = sandbox.eval(&msg(), "()").unwrap();
        assert!(outcome.result.is_none());
    }

    #[test]
    fn message_global_is_readable() {
        let sandbox = Sandbox::new(Duration::from_secs(1));
        let outcome = sandbox.eval(&msg(), "message.channel").unwrap();
        assert_eq!(outcome.result.as_deref(), Some("c1"));
    }

    #[test]
    fn send_alarm_is_buffered_not_executed_synchronously() {
        let sandbox = Sandbox::new(Duration::from_secs(1));
        let outcome = sandbox
            .eval(&msg(), r#"send_alarm("overheat"); ()"#)
            .unwrap();
        assert_eq!(outcome.effects.len(), 1);
        match &outcome.effects[0] {
            SandboxEffect::SendAlarm { payload } => assert_eq!(payload, "overheat"),
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn send_email_captures_recipients() {
        let sandbox = Sandbox::new(Duration::from_secs(1));
        let outcome = sandbox
            .eval(
                &msg(),
                r#"send_email(["a@example.com", "b@example.com"], "subj", "body"); ()"#,
            )
            .unwrap();
        match &outcome.effects[0] {
            SandboxEffect::SendEmail { to, subject, body } => {
                assert_eq!(to, &vec!["a@example.com".to_string(), "b@example.com".to_string()]);
                assert_eq!(subject, "subj");
                assert_eq!(body, "body");
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn script_error_propagates() {
        let sandbox = Sandbox::new(Duration::from_secs(1));
        let err = sandbox.eval(&msg(), "1 / 0").unwrap_err();
        assert_eq!(err.category(), "ScriptExecution");
    }

    #[test]
    fn infinite_loop_is_aborted_by_timeout() {
        let sandbox = Sandbox::new(Duration::from_millis(50));
        let err = sandbox.eval(&msg(), "loop {}").unwrap_err();
        assert_eq!(err.category(), "ScriptExecution");
    }
}
