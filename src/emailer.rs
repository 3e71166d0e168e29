//! Emailer collaborator: delivers multipart mail with attachments.
//! Used both for the Script Sandbox's `send_email` host callback and
//! the Report Generator's optional delivery step.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use std::sync::Mutex;

/// `SendEmailNotification(to, from, subject, header, content, body, footer)`.
#[async_trait]
pub trait Emailer: Send + Sync {
    async fn send_email_notification(
        &self,
        to: &[String],
        from: &str,
        subject: &str,
        header: &str,
        content: &str,
        body: &str,
        footer: &str,
    ) -> Result<()>;

    /// Send a report's rendered PDF/CSV as attachments. Separate from
    /// `send_email_notification` because the Report Generator's body
    /// is the JSON-serialized `ReportPage`, not a header/content/body/footer
    /// quartet.
    async fn send_report(
        &self,
        to: &[String],
        from: &str,
        subject: &str,
        body_json: &str,
        pdf: &[u8],
        csv: &[u8],
    ) -> Result<()>;
}

/// SMTP-backed `Emailer` built on `lettre`.
pub struct SmtpEmailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailer {
    pub fn new(host: &str, port: u16, username: Option<&str>, password: Option<&str>) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port);
        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }
        Ok(SmtpEmailer {
            transport: builder.build(),
        })
    }

    fn build_message(
        to: &[String],
        from: &str,
        subject: &str,
        text: String,
    ) -> Result<LettreMessage> {
        let mut builder = LettreMessage::builder()
            .from(from.parse().map_err(EngineError::from)?)
            .subject(subject);
        for addr in to {
            builder = builder.to(addr.parse().map_err(EngineError::from)?);
        }
        builder
            .body(text)
            .map_err(|e| EngineError::Email(e.to_string()))
    }

    fn build_report_message(
        to: &[String],
        from: &str,
        subject: &str,
        body_json: &str,
        pdf: &[u8],
        csv: &[u8],
    ) -> Result<LettreMessage> {
        let mut builder = LettreMessage::builder()
            .from(from.parse().map_err(EngineError::from)?)
            .subject(subject);
        for addr in to {
            builder = builder.to(addr.parse().map_err(EngineError::from)?);
        }

        let multipart = MultiPart::mixed()
            .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(body_json.to_string()))
            .singlepart(
                Attachment::new("report.pdf".to_string())
                    .body(pdf.to_vec(), ContentType::parse("application/pdf").unwrap()),
            )
            .singlepart(
                Attachment::new("report.csv".to_string())
                    .body(csv.to_vec(), ContentType::parse("text/csv").unwrap()),
            );

        builder
            .multipart(multipart)
            .map_err(|e| EngineError::Email(e.to_string()))
    }
}

#[async_trait]
impl Emailer for SmtpEmailer {
    async fn send_email_notification(
        &self,
        to: &[String],
        from: &str,
        subject: &str,
        header: &str,
        content: &str,
        body: &str,
        footer: &str,
    ) -> Result<()> {
        let text = format!("{header}\n{content}\n{body}\n{footer}");
        let message = Self::build_message(to, from, subject, text)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| EngineError::Email(e.to_string()))?;
        Ok(())
    }

    async fn send_report(
        &self,
        to: &[String],
        from: &str,
        subject: &str,
        body_json: &str,
        pdf: &[u8],
        csv: &[u8],
    ) -> Result<()> {
        let message = Self::build_report_message(to, from, subject, body_json, pdf, csv)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| EngineError::Email(e.to_string()))?;
        Ok(())
    }
}

/// Records sent mail in-memory. Used by unit and integration tests in
/// place of an SMTP server.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct InMemoryEmailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl InMemoryEmailer {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("emailer lock poisoned").clone()
    }
}

#[async_trait]
impl Emailer for InMemoryEmailer {
    async fn send_email_notification(
        &self,
        to: &[String],
        _from: &str,
        subject: &str,
        header: &str,
        content: &str,
        body: &str,
        footer: &str,
    ) -> Result<()> {
        self.sent.lock().expect("emailer lock poisoned").push(SentEmail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: format!("{header}\n{content}\n{body}\n{footer}"),
        });
        Ok(())
    }

    async fn send_report(
        &self,
        to: &[String],
        _from: &str,
        subject: &str,
        body_json: &str,
        _pdf: &[u8],
        _csv: &[u8],
    ) -> Result<()> {
        self.sent.lock().expect("emailer lock poisoned").push(SentEmail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body_json.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_emailer_records_sent_notifications() {
        let emailer = InMemoryEmailer::default();
        emailer
            .send_email_notification(
                &["a@example.com".to_string()],
                "re@engine",
                "subject",
                "h",
                "c",
                "b",
                "f",
            )
            .await
            .unwrap();
        let sent = emailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@example.com".to_string()]);
        assert_eq!(sent[0].subject, "subject");
    }
}
