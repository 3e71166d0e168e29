//! Rule Executor: runs one rule against one message (or synthetic
//! scheduled tick) through a fresh Script Sandbox and routes the
//! result.

use crate::emailer::Emailer;
use crate::error::Result;
use crate::messaging::{PubSub, Publisher};
use crate::model::{Message, Rule};
use crate::sandbox::{Sandbox, SandboxEffect};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Runs a single rule invocation: instantiate the sandbox, evaluate
/// the rule's logic, drain buffered host-callback effects, and route
/// the final expression value to the rule's output binding.
pub struct Executor {
    publisher_id: String,
    email_from: String,
    script_timeout: Duration,
    re_pub: Arc<dyn PubSub>,
    writers_pub: Arc<dyn Publisher>,
    alarms_pub: Arc<dyn Publisher>,
    emailer: Arc<dyn Emailer>,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        publisher_id: String,
        email_from: String,
        script_timeout: Duration,
        re_pub: Arc<dyn PubSub>,
        writers_pub: Arc<dyn Publisher>,
        alarms_pub: Arc<dyn Publisher>,
        emailer: Arc<dyn Emailer>,
    ) -> Self {
        Executor {
            publisher_id,
            email_from,
            script_timeout,
            re_pub,
            writers_pub,
            alarms_pub,
            emailer,
        }
    }

    #[instrument(skip(self, rule, msg), fields(rule_id = %rule.id, domain_id = %rule.domain_id))]
    pub async fn execute(&self, rule: &Rule, msg: &Message) -> Result<()> {
        let sandbox = Sandbox::new(self.script_timeout);
        let outcome = sandbox.eval(msg, &rule.logic.value)?;

        for effect in outcome.effects {
            if let Err(e) = self.apply_effect(rule, msg, effect).await {
                warn!(error = %e, rule_id = %rule.id, "host callback effect failed");
                return Err(e);
            }
        }

        if let (Some(value), Some(output)) = (outcome.result, &rule.output) {
            let out_msg = Message {
                publisher: self.publisher_id.clone(),
                channel: output.channel.clone(),
                subtopic: output.topic.clone(),
                payload: value.into_bytes(),
                created: chrono::Utc::now().timestamp(),
                domain: rule.domain_id.clone(),
                protocol: msg.protocol.clone(),
                metadata: None,
            };
            self.re_pub.publish(&output.channel, out_msg).await?;
        }

        Ok(())
    }

    async fn apply_effect(&self, rule: &Rule, msg: &Message, effect: SandboxEffect) -> Result<()> {
        match effect {
            SandboxEffect::SendEmail { to, subject, body } => {
                self.emailer
                    .send_email_notification(&to, &self.email_from, &subject, "", &body, &body, "")
                    .await
            }
            SandboxEffect::SaveSenml { payload } => {
                let out = Message {
                    publisher: self.publisher_id.clone(),
                    channel: msg.channel.clone(),
                    subtopic: msg.subtopic.clone(),
                    payload: payload.into_bytes(),
                    created: chrono::Utc::now().timestamp(),
                    domain: rule.domain_id.clone(),
                    protocol: msg.protocol.clone(),
                    metadata: None,
                };
                self.writers_pub.publish(&msg.channel, out).await
            }
            SandboxEffect::SendAlarm { payload } => {
                let mut metadata = msg.metadata.clone().unwrap_or_default();
                metadata.insert("rule_id".to_string(), serde_json::Value::String(rule.id.clone()));
                metadata.insert(
                    "source_message".to_string(),
                    serde_json::to_value(msg).unwrap_or(serde_json::Value::Null),
                );
                let out = Message {
                    publisher: self.publisher_id.clone(),
                    channel: msg.channel.clone(),
                    subtopic: msg.subtopic.clone(),
                    payload: payload.into_bytes(),
                    created: chrono::Utc::now().timestamp(),
                    domain: rule.domain_id.clone(),
                    protocol: msg.protocol.clone(),
                    metadata: Some(metadata),
                };
                self.alarms_pub.publish(&msg.channel, out).await
            }
        }
    }
}
