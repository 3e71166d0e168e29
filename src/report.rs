//! Report Generator: fetches aggregated history, filters, groups,
//! renders PDF + CSV, and optionally emails the result.

use crate::config::EngineSettings;
use crate::emailer::Emailer;
use crate::error::{EngineError, Result};
use crate::model::{Page, Report, ReportConfig, SenmlSample};
use crate::readers::{Readers, ReadersRequest};
use printpdf::{BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Point, Pt, TextItem};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

const PAGE_SIZE: u64 = 10;
const READERS_INTERVAL: &str = "1s";

pub struct ReportGenerator {
    readers: Arc<dyn Readers>,
    emailer: Arc<dyn Emailer>,
    settings: EngineSettings,
}

impl ReportGenerator {
    pub fn new(readers: Arc<dyn Readers>, emailer: Arc<dyn Emailer>, settings: EngineSettings) -> Self {
        ReportGenerator {
            readers,
            emailer,
            settings,
        }
    }

    #[instrument(skip(self, cfg), fields(report_config_id = %cfg.id, domain_id = %cfg.domain_id))]
    pub async fn generate(&self, cfg: &ReportConfig) -> Result<Page<Report>> {
        let now = chrono::Utc::now();
        let mut fetched = Vec::new();
        for channel in &cfg.channel_ids {
            let req = ReadersRequest {
                channel: channel.clone(),
                domain: cfg.domain_id.clone(),
                aggregation: cfg.aggregation,
                limit: PAGE_SIZE,
                offset: 0,
                from: self.settings.reports_epoch,
                to: now,
                interval: READERS_INTERVAL.to_string(),
            };
            let samples = self.readers.read_messages(req).await?;
            fetched.extend(samples);
        }

        let retained: Vec<SenmlSample> = fetched
            .into_iter()
            .filter(|s| cfg.client_ids.iter().any(|c| c == &s.publisher))
            .filter(|s| cfg.metrics.is_empty() || cfg.metrics.iter().any(|m| s.name.contains(m.as_str())))
            .collect();

        let mut groups: HashMap<String, Vec<SenmlSample>> = HashMap::new();
        for sample in retained {
            groups.entry(sample.publisher.clone()).or_default().push(sample);
        }
        for samples in groups.values_mut() {
            samples.sort_by_key(|s| s.time);
        }

        let pdf = render_pdf(&groups);
        let csv = render_csv(&groups)?;

        let report = Report {
            samples: groups,
            pdf,
            csv,
        };

        let page = Page {
            offset: 0,
            limit: 1,
            total: report.total(),
            items: vec![report],
        };

        if let Some(email) = &cfg.email {
            if !email.to.is_empty() {
                let body = serde_json::to_string(&page).map_err(EngineError::from)?;
                let (pdf_bytes, csv_bytes) = page
                    .items
                    .first()
                    .map(|r| (r.pdf.clone(), r.csv.clone()))
                    .unwrap_or_default();
                self.emailer
                    .send_report(&email.to, &email.from, &email.subject, &body, &pdf_bytes, &csv_bytes)
                    .await?;
            }
        }

        Ok(page)
    }
}

fn render_pdf(groups: &HashMap<String, Vec<SenmlSample>>) -> Vec<u8> {
    let mut doc = PdfDocument::new("Device Metrics Report");
    let font = BuiltinFont::Helvetica;

    let mut ops = vec![
        Op::StartTextSection,
        Op::SetTextCursor {
            pos: Point::new(Mm(15.0), Mm(280.0)),
        },
        Op::SetFontSizeBuiltinFont { size: Pt(18.0), font },
        Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text("Device Metrics Report".to_string())],
            font,
        },
        Op::EndTextSection,
    ];

    let mut y = 265.0;
    let mut publishers: Vec<&String> = groups.keys().collect();
    publishers.sort();
    for publisher in publishers {
        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor {
            pos: Point::new(Mm(15.0), Mm(y)),
        });
        ops.push(Op::SetFontSizeBuiltinFont { size: Pt(13.0), font });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(format!("Device: {publisher}"))],
            font,
        });
        ops.push(Op::EndTextSection);
        y -= 6.0;

        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextCursor {
            pos: Point::new(Mm(15.0), Mm(y)),
        });
        ops.push(Op::SetFontSizeBuiltinFont { size: Pt(10.0), font });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text("Metric Name | Value | Unit | Time".to_string())],
            font,
        });
        ops.push(Op::EndTextSection);
        y -= 5.0;

        for sample in &groups[publisher] {
            let line = format!(
                "{} | {} | {} | {}",
                sample.name,
                sample.display_value(),
                sample.unit.clone().unwrap_or_default(),
                sample.time.format("%Y-%m-%d %H:%M:%S"),
            );
            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point::new(Mm(15.0), Mm(y)),
            });
            ops.push(Op::SetFontSizeBuiltinFont { size: Pt(9.0), font });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(line)],
                font,
            });
            ops.push(Op::EndTextSection);
            y -= 5.0;
        }
        y -= 4.0;
    }

    let page = PdfPage::new(Mm(210.0), Mm(297.0), ops);
    let mut warnings = Vec::new();
    doc.with_pages(vec![page])
        .save(&PdfSaveOptions::default(), &mut warnings)
}

fn render_csv(groups: &HashMap<String, Vec<SenmlSample>>) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let mut publishers: Vec<&String> = groups.keys().collect();
    publishers.sort();

    for publisher in publishers {
        writer
            .write_record([format!("Device: {publisher}")])
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        writer
            .write_record(["Metric Name", "Value", "Unit", "Time", "Channel", "Subtopic"])
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        for sample in &groups[publisher] {
            writer
                .write_record([
                    sample.name.clone(),
                    sample.display_value(),
                    sample.unit.clone().unwrap_or_default(),
                    sample.time.format("%Y-%m-%d %H:%M:%S").to_string(),
                    sample.channel.clone(),
                    sample.subtopic.clone(),
                ])
                .map_err(|e| EngineError::Internal(e.to_string()))?;
        }
        writer
            .write_record([""; 6])
            .map_err(|e| EngineError::Internal(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| EngineError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emailer::InMemoryEmailer;
    use crate::model::{Aggregation, EmailDescriptor, Recurring, Schedule, Status};
    use async_trait::async_trait;
    use chrono::Utc;

    struct FixedReaders {
        samples: Vec<SenmlSample>,
    }

    #[async_trait]
    impl Readers for FixedReaders {
        async fn read_messages(&self, _req: ReadersRequest) -> Result<Vec<SenmlSample>> {
            Ok(self.samples.clone())
        }
    }

    fn sample(publisher: &str, name: &str, value: f64) -> SenmlSample {
        SenmlSample {
            publisher: publisher.to_string(),
            channel: "ch".to_string(),
            subtopic: String::new(),
            name: name.to_string(),
            unit: Some("C".to_string()),
            time: Utc::now(),
            value: Some(value),
            string_value: None,
            bool_value: None,
            data_value: None,
        }
    }

    fn cfg(email: Option<crate::model::EmailDescriptor>) -> ReportConfig {
        ReportConfig {
            id: "rc1".to_string(),
            name: "rc1".to_string(),
            domain_id: "dom1".to_string(),
            channel_ids: vec!["ch".to_string()],
            client_ids: vec!["dev1".to_string()],
            metrics: vec!["temp".to_string()],
            aggregation: Aggregation::Unspecified,
            email,
            schedule: Schedule {
                start_date_time: Utc::now(),
                time: Utc::now(),
                recurring: Recurring::None,
                recurring_period: 0,
            },
            limit: 10,
            status: Status::Enabled,
            created_at: Utc::now(),
            created_by: "tester".to_string(),
            updated_at: None,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn e5_report_filter_keeps_only_matching_client_and_metric() {
        let readers = Arc::new(FixedReaders {
            samples: vec![
                sample("dev1", "temperature", 20.0),
                sample("dev2", "temperature", 21.0),
            ],
        });
        let emailer = Arc::new(InMemoryEmailer::default());
        let gen = ReportGenerator::new(readers, emailer, EngineSettings {
            publisher_id: "magistrala.re".to_string(),
            reports_epoch: Utc::now(),
            tick_ms: 1000,
            error_channel_capacity: 16,
            script_timeout_ms: 1000,
        });

        let page = gen.generate(&cfg(None)).await.unwrap();
        assert_eq!(page.total, 1);
        let report = &page.items[0];
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.samples["dev1"].len(), 1);
        assert!(!report.pdf.is_empty());
        let csv_text = String::from_utf8(report.csv.clone()).unwrap();
        assert!(csv_text.contains("Device: dev1"));
        assert!(!csv_text.contains("dev2"));
    }

    #[tokio::test]
    async fn emails_report_when_recipients_configured() {
        let readers = Arc::new(FixedReaders {
            samples: vec![sample("dev1", "temperature", 20.0)],
        });
        let emailer = Arc::new(InMemoryEmailer::default());
        let gen = ReportGenerator::new(readers, emailer.clone(), EngineSettings {
            publisher_id: "magistrala.re".to_string(),
            reports_epoch: Utc::now(),
            tick_ms: 1000,
            error_channel_capacity: 16,
            script_timeout_ms: 1000,
        });

        gen.generate(&cfg(Some(EmailDescriptor {
            from: "re@engine".to_string(),
            to: vec!["alerts@example.com".to_string()],
            subject: "Report".to_string(),
        })))
        .await
        .unwrap();

        assert_eq!(emailer.sent().len(), 1);
    }
}
