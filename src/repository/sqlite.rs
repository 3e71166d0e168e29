//! SQLite-backed `RuleRepository` / `ReportRepository`.
//!
//! `TEXT[]` array-typed columns (`channel_ids`, `client_ids`,
//! `metrics`, `to`) become JSON-encoded `TEXT` columns, since `sqlx`
//! is compiled with the `sqlite` feature rather than `postgres`.

use super::{ReportRepository, RuleRepository};
use crate::error::{EngineError, Result};
use crate::model::{
    Aggregation, Binding, EmailDescriptor, Logic, LogicKind, Page, PageMeta, Recurring,
    ReportConfig, Rule, Schedule, Status,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn connect(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url)
            .await
            .map_err(EngineError::from)?;
        let repo = SqliteRepository { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        SqliteRepository { pool }
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rules (
                id                TEXT PRIMARY KEY,
                name              TEXT NOT NULL,
                domain_id         TEXT NOT NULL,
                metadata          TEXT NOT NULL DEFAULT '{}',
                created_by        TEXT,
                created_at        TEXT NOT NULL,
                updated_at        TEXT,
                updated_by        TEXT,
                input_channel     TEXT NOT NULL,
                input_topic       TEXT NOT NULL DEFAULT '',
                output_channel    TEXT,
                output_topic      TEXT,
                status            INTEGER NOT NULL DEFAULT 0,
                logic_type        TEXT NOT NULL,
                logic_value       TEXT NOT NULL,
                start_datetime    TEXT NOT NULL,
                time              TEXT NOT NULL,
                recurring         TEXT NOT NULL DEFAULT 'NONE',
                recurring_period  INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_rules_input
                ON rules (input_channel, input_topic, status)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS report_config (
                id                TEXT PRIMARY KEY,
                name              TEXT NOT NULL,
                domain_id         TEXT NOT NULL,
                "limit"           INTEGER NOT NULL DEFAULT 10,
                channel_ids       TEXT NOT NULL DEFAULT '[]',
                client_ids        TEXT NOT NULL DEFAULT '[]',
                metrics           TEXT NOT NULL DEFAULT '[]',
                aggregation       TEXT NOT NULL DEFAULT 'UNSPECIFIED',
                "to"              TEXT NOT NULL DEFAULT '[]',
                "from"            TEXT,
                subject           TEXT,
                status            INTEGER NOT NULL DEFAULT 0,
                created_at        TEXT NOT NULL,
                created_by        TEXT,
                updated_at        TEXT,
                updated_by        TEXT,
                start_datetime    TEXT NOT NULL,
                time              TEXT NOT NULL,
                recurring         TEXT NOT NULL DEFAULT 'NONE',
                recurring_period  INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;

        Ok(())
    }
}

fn status_to_i64(s: Status) -> i64 {
    match s {
        Status::Enabled => 0,
        Status::Disabled => 1,
    }
}

fn status_from_i64(v: i64) -> Status {
    if v == 0 {
        Status::Enabled
    } else {
        Status::Disabled
    }
}

fn recurring_to_str(r: Recurring) -> &'static str {
    match r {
        Recurring::None => "NONE",
        Recurring::Daily => "DAILY",
        Recurring::Weekly => "WEEKLY",
        Recurring::Monthly => "MONTHLY",
    }
}

fn recurring_from_str(s: &str) -> Recurring {
    match s {
        "DAILY" => Recurring::Daily,
        "WEEKLY" => Recurring::Weekly,
        "MONTHLY" => Recurring::Monthly,
        _ => Recurring::None,
    }
}

fn aggregation_to_str(a: Aggregation) -> &'static str {
    match a {
        Aggregation::Unspecified => "UNSPECIFIED",
        Aggregation::Min => "MIN",
        Aggregation::Max => "MAX",
        Aggregation::Avg => "AVG",
        Aggregation::Sum => "SUM",
        Aggregation::Count => "COUNT",
    }
}

fn aggregation_from_str(s: &str) -> Aggregation {
    match s {
        "MIN" => Aggregation::Min,
        "MAX" => Aggregation::Max,
        "AVG" => Aggregation::Avg,
        "SUM" => Aggregation::Sum,
        "COUNT" => Aggregation::Count,
        _ => Aggregation::Unspecified,
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Serialization(format!("bad timestamp {raw}: {e}")))
}

fn rule_from_row(row: SqliteRow) -> Result<Rule> {
    let metadata_json: String = row.try_get("metadata").map_err(EngineError::from)?;
    let metadata: HashMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_json).unwrap_or_default();
    let updated_at: Option<String> = row.try_get("updated_at").map_err(EngineError::from)?;
    let output_channel: Option<String> = row.try_get("output_channel").map_err(EngineError::from)?;
    let output_topic: Option<String> = row.try_get("output_topic").map_err(EngineError::from)?;

    Ok(Rule {
        id: row.try_get("id").map_err(EngineError::from)?,
        name: row.try_get("name").map_err(EngineError::from)?,
        domain_id: row.try_get("domain_id").map_err(EngineError::from)?,
        metadata,
        input: Binding {
            channel: row.try_get("input_channel").map_err(EngineError::from)?,
            topic: row.try_get("input_topic").map_err(EngineError::from)?,
        },
        logic: Logic {
            kind: LogicKind::Rhai,
            value: row.try_get("logic_value").map_err(EngineError::from)?,
        },
        output: output_channel.map(|channel| Binding {
            channel,
            topic: output_topic.unwrap_or_default(),
        }),
        schedule: Schedule {
            start_date_time: parse_ts(&row.try_get::<String, _>("start_datetime").map_err(EngineError::from)?)?,
            time: parse_ts(&row.try_get::<String, _>("time").map_err(EngineError::from)?)?,
            recurring: recurring_from_str(&row.try_get::<String, _>("recurring").map_err(EngineError::from)?),
            recurring_period: row.try_get::<i64, _>("recurring_period").map_err(EngineError::from)? as u32,
        },
        status: status_from_i64(row.try_get("status").map_err(EngineError::from)?),
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(EngineError::from)?)?,
        created_by: row.try_get::<Option<String>, _>("created_by").map_err(EngineError::from)?.unwrap_or_default(),
        updated_at: updated_at.map(|s| parse_ts(&s)).transpose()?,
        updated_by: row.try_get("updated_by").map_err(EngineError::from)?,
    })
}

fn report_from_row(row: SqliteRow) -> Result<ReportConfig> {
    let channel_ids: String = row.try_get("channel_ids").map_err(EngineError::from)?;
    let client_ids: String = row.try_get("client_ids").map_err(EngineError::from)?;
    let metrics: String = row.try_get("metrics").map_err(EngineError::from)?;
    let aggregation: String = row.try_get("aggregation").map_err(EngineError::from)?;
    let to: String = row.try_get("to").map_err(EngineError::from)?;
    let from: Option<String> = row.try_get("from").map_err(EngineError::from)?;
    let subject: Option<String> = row.try_get("subject").map_err(EngineError::from)?;
    let updated_at: Option<String> = row.try_get("updated_at").map_err(EngineError::from)?;

    let to: Vec<String> = serde_json::from_str(&to).unwrap_or_default();
    let email = match (from, subject) {
        (Some(from), Some(subject)) if !to.is_empty() => Some(EmailDescriptor { from, to, subject }),
        _ => None,
    };

    Ok(ReportConfig {
        id: row.try_get("id").map_err(EngineError::from)?,
        name: row.try_get("name").map_err(EngineError::from)?,
        domain_id: row.try_get("domain_id").map_err(EngineError::from)?,
        channel_ids: serde_json::from_str(&channel_ids).unwrap_or_default(),
        client_ids: serde_json::from_str(&client_ids).unwrap_or_default(),
        metrics: serde_json::from_str(&metrics).unwrap_or_default(),
        aggregation: aggregation_from_str(&aggregation),
        email,
        schedule: Schedule {
            start_date_time: parse_ts(&row.try_get::<String, _>("start_datetime").map_err(EngineError::from)?)?,
            time: parse_ts(&row.try_get::<String, _>("time").map_err(EngineError::from)?)?,
            recurring: recurring_from_str(&row.try_get::<String, _>("recurring").map_err(EngineError::from)?),
            recurring_period: row.try_get::<i64, _>("recurring_period").map_err(EngineError::from)? as u32,
        },
        limit: row.try_get::<i64, _>("limit").map_err(EngineError::from)? as u64,
        status: status_from_i64(row.try_get("status").map_err(EngineError::from)?),
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(EngineError::from)?)?,
        created_by: row.try_get::<Option<String>, _>("created_by").map_err(EngineError::from)?.unwrap_or_default(),
        updated_at: updated_at.map(|s| parse_ts(&s)).transpose()?,
        updated_by: row.try_get("updated_by").map_err(EngineError::from)?,
    })
}

#[async_trait]
impl RuleRepository for SqliteRepository {
    async fn add_rule(&self, rule: Rule) -> Result<Rule> {
        let metadata = serde_json::to_string(&rule.metadata)?;
        let (output_channel, output_topic) = match &rule.output {
            Some(b) => (Some(b.channel.clone()), Some(b.topic.clone())),
            None => (None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO rules (
                id, name, domain_id, metadata, created_by, created_at,
                input_channel, input_topic, output_channel, output_topic,
                status, logic_type, logic_value, start_datetime, time,
                recurring, recurring_period
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(&rule.domain_id)
        .bind(&metadata)
        .bind(&rule.created_by)
        .bind(rule.created_at.to_rfc3339())
        .bind(&rule.input.channel)
        .bind(&rule.input.topic)
        .bind(&output_channel)
        .bind(&output_topic)
        .bind(status_to_i64(rule.status))
        .bind("rhai")
        .bind(&rule.logic.value)
        .bind(rule.schedule.start_date_time.to_rfc3339())
        .bind(rule.schedule.time.to_rfc3339())
        .bind(recurring_to_str(rule.schedule.recurring))
        .bind(rule.schedule.recurring_period as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Create(e.to_string()))?;

        Ok(rule)
    }

    async fn view_rule(&self, id: &str) -> Result<Rule> {
        let row = sqlx::query("SELECT * FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::View(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound("rule", id.to_string()))?;
        rule_from_row(row)
    }

    async fn update_rule(&self, rule: Rule) -> Result<Rule> {
        let metadata = serde_json::to_string(&rule.metadata)?;
        let (output_channel, output_topic) = match &rule.output {
            Some(b) => (Some(b.channel.clone()), Some(b.topic.clone())),
            None => (None, None),
        };
        let result = sqlx::query(
            r#"
            UPDATE rules SET name = ?, metadata = ?, input_channel = ?,
                input_topic = ?, output_channel = ?, output_topic = ?,
                logic_value = ?, updated_at = ?, updated_by = ?
            WHERE id = ?
            "#,
        )
        .bind(&rule.name)
        .bind(&metadata)
        .bind(&rule.input.channel)
        .bind(&rule.input.topic)
        .bind(&output_channel)
        .bind(&output_topic)
        .bind(&rule.logic.value)
        .bind(rule.updated_at.map(|t| t.to_rfc3339()))
        .bind(&rule.updated_by)
        .bind(&rule.id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Update(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("rule", rule.id));
        }
        self.view_rule(&rule.id).await
    }

    async fn update_rule_schedule(&self, rule: Rule) -> Result<Rule> {
        let result = sqlx::query(
            r#"
            UPDATE rules SET start_datetime = ?, time = ?, recurring = ?,
                recurring_period = ?, updated_at = ?, updated_by = ?
            WHERE id = ?
            "#,
        )
        .bind(rule.schedule.start_date_time.to_rfc3339())
        .bind(rule.schedule.time.to_rfc3339())
        .bind(recurring_to_str(rule.schedule.recurring))
        .bind(rule.schedule.recurring_period as i64)
        .bind(rule.updated_at.map(|t| t.to_rfc3339()))
        .bind(&rule.updated_by)
        .bind(&rule.id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Update(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("rule", rule.id));
        }
        self.view_rule(&rule.id).await
    }

    async fn update_rule_status(&self, rule: Rule) -> Result<Rule> {
        let current = self.view_rule(&rule.id).await?;
        if current.status == rule.status {
            return Err(EngineError::Invalid(
                "status",
                format!("rule {} already in status {:?}", rule.id, rule.status),
            ));
        }
        let result = sqlx::query(
            "UPDATE rules SET status = ?, updated_at = ?, updated_by = ? WHERE id = ?",
        )
        .bind(status_to_i64(rule.status))
        .bind(rule.updated_at.map(|t| t.to_rfc3339()))
        .bind(&rule.updated_by)
        .bind(&rule.id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Update(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("rule", rule.id));
        }
        self.view_rule(&rule.id).await
    }

    async fn update_rule_due(&self, id: &str, due: DateTime<Utc>) -> Result<Rule> {
        let result = sqlx::query("UPDATE rules SET time = ? WHERE id = ?")
            .bind(due.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Update(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("rule", id.to_string()));
        }
        self.view_rule(id).await
    }

    async fn remove_rule(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Remove(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("rule", id.to_string()));
        }
        Ok(())
    }

    async fn list_rules(&self, filter: PageMeta) -> Result<Page<Rule>> {
        let mut sql = String::from("SELECT * FROM rules WHERE 1=1");
        if filter.domain.is_some() {
            sql.push_str(" AND domain_id = ?");
        }
        if filter.input_channel.is_some() {
            sql.push_str(" AND input_channel = ?");
        }
        if filter.input_topic.is_some() {
            sql.push_str(" AND (input_topic = '' OR input_topic = ?)");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.name.is_some() {
            sql.push_str(" AND name LIKE ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(domain) = &filter.domain {
            query = query.bind(domain);
        }
        if let Some(channel) = &filter.input_channel {
            query = query.bind(channel);
        }
        if let Some(topic) = &filter.input_topic {
            query = query.bind(topic);
        }
        if let Some(status) = filter.status {
            query = query.bind(status_to_i64(status));
        }
        if let Some(name) = &filter.name {
            query = query.bind(format!("%{name}%"));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::View(e.to_string()))?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(rule_from_row(row)?);
        }
        // scheduled_before/after/recurring filters are cheap enough to
        // apply in-process rather than as additional dynamic SQL predicates.
        rules.retain(|r| {
            filter.scheduled_before.map(|b| r.schedule.time <= b).unwrap_or(true)
                && filter.scheduled_after.map(|a| r.schedule.time >= a).unwrap_or(true)
                && filter.recurring.map(|rec| r.schedule.recurring == rec).unwrap_or(true)
        });

        let total = rules.len() as u64;
        let limit = if filter.limit == 0 { total.max(1) } else { filter.limit };
        let offset = filter.offset.min(total) as usize;
        let end = offset.saturating_add(limit as usize).min(rules.len());
        let items = rules.drain(offset..end).collect();

        Ok(Page {
            offset: filter.offset,
            limit,
            total,
            items,
        })
    }
}

#[async_trait]
impl ReportRepository for SqliteRepository {
    async fn add_report_config(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let channel_ids = serde_json::to_string(&cfg.channel_ids)?;
        let client_ids = serde_json::to_string(&cfg.client_ids)?;
        let metrics = serde_json::to_string(&cfg.metrics)?;
        let (from, to, subject) = match &cfg.email {
            Some(e) => (
                Some(e.from.clone()),
                serde_json::to_string(&e.to)?,
                Some(e.subject.clone()),
            ),
            None => (None, "[]".to_string(), None),
        };

        sqlx::query(
            r#"
            INSERT INTO report_config (
                id, name, domain_id, "limit", channel_ids, client_ids, metrics,
                aggregation, "to", "from", subject, status, created_at, created_by,
                start_datetime, time, recurring, recurring_period
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&cfg.id)
        .bind(&cfg.name)
        .bind(&cfg.domain_id)
        .bind(cfg.limit as i64)
        .bind(&channel_ids)
        .bind(&client_ids)
        .bind(&metrics)
        .bind(aggregation_to_str(cfg.aggregation))
        .bind(&to)
        .bind(&from)
        .bind(&subject)
        .bind(status_to_i64(cfg.status))
        .bind(cfg.created_at.to_rfc3339())
        .bind(&cfg.created_by)
        .bind(cfg.schedule.start_date_time.to_rfc3339())
        .bind(cfg.schedule.time.to_rfc3339())
        .bind(recurring_to_str(cfg.schedule.recurring))
        .bind(cfg.schedule.recurring_period as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Create(e.to_string()))?;

        Ok(cfg)
    }

    async fn view_report_config(&self, id: &str) -> Result<ReportConfig> {
        let row = sqlx::query("SELECT * FROM report_config WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::View(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound("report_config", id.to_string()))?;
        report_from_row(row)
    }

    async fn update_report_config(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let channel_ids = serde_json::to_string(&cfg.channel_ids)?;
        let client_ids = serde_json::to_string(&cfg.client_ids)?;
        let metrics = serde_json::to_string(&cfg.metrics)?;
        let (from, to, subject) = match &cfg.email {
            Some(e) => (
                Some(e.from.clone()),
                serde_json::to_string(&e.to)?,
                Some(e.subject.clone()),
            ),
            None => (None, "[]".to_string(), None),
        };

        let result = sqlx::query(
            r#"
            UPDATE report_config SET name = ?, "limit" = ?, channel_ids = ?,
                client_ids = ?, metrics = ?, aggregation = ?, "to" = ?, "from" = ?,
                subject = ?, updated_at = ?, updated_by = ?
            WHERE id = ?
            "#,
        )
        .bind(&cfg.name)
        .bind(cfg.limit as i64)
        .bind(&channel_ids)
        .bind(&client_ids)
        .bind(&metrics)
        .bind(aggregation_to_str(cfg.aggregation))
        .bind(&to)
        .bind(&from)
        .bind(&subject)
        .bind(cfg.updated_at.map(|t| t.to_rfc3339()))
        .bind(&cfg.updated_by)
        .bind(&cfg.id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Update(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("report_config", cfg.id));
        }
        self.view_report_config(&cfg.id).await
    }

    async fn update_report_config_schedule(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let result = sqlx::query(
            r#"
            UPDATE report_config SET start_datetime = ?, time = ?, recurring = ?,
                recurring_period = ?, updated_at = ?, updated_by = ?
            WHERE id = ?
            "#,
        )
        .bind(cfg.schedule.start_date_time.to_rfc3339())
        .bind(cfg.schedule.time.to_rfc3339())
        .bind(recurring_to_str(cfg.schedule.recurring))
        .bind(cfg.schedule.recurring_period as i64)
        .bind(cfg.updated_at.map(|t| t.to_rfc3339()))
        .bind(&cfg.updated_by)
        .bind(&cfg.id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Update(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("report_config", cfg.id));
        }
        self.view_report_config(&cfg.id).await
    }

    async fn update_report_config_status(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let current = self.view_report_config(&cfg.id).await?;
        if current.status == cfg.status {
            return Err(EngineError::Invalid(
                "status",
                format!("report config {} already in status {:?}", cfg.id, cfg.status),
            ));
        }
        let result = sqlx::query(
            "UPDATE report_config SET status = ?, updated_at = ?, updated_by = ? WHERE id = ?",
        )
        .bind(status_to_i64(cfg.status))
        .bind(cfg.updated_at.map(|t| t.to_rfc3339()))
        .bind(&cfg.updated_by)
        .bind(&cfg.id)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Update(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("report_config", cfg.id));
        }
        self.view_report_config(&cfg.id).await
    }

    async fn update_report_config_due(&self, id: &str, due: DateTime<Utc>) -> Result<ReportConfig> {
        let result = sqlx::query("UPDATE report_config SET time = ? WHERE id = ?")
            .bind(due.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Update(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("report_config", id.to_string()));
        }
        self.view_report_config(id).await
    }

    async fn remove_report_config(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM report_config WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Remove(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("report_config", id.to_string()));
        }
        Ok(())
    }

    async fn list_report_configs(&self, filter: PageMeta) -> Result<Page<ReportConfig>> {
        let mut sql = String::from("SELECT * FROM report_config WHERE 1=1");
        if filter.domain.is_some() {
            sql.push_str(" AND domain_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.name.is_some() {
            sql.push_str(" AND name LIKE ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql);
        if let Some(domain) = &filter.domain {
            query = query.bind(domain);
        }
        if let Some(status) = filter.status {
            query = query.bind(status_to_i64(status));
        }
        if let Some(name) = &filter.name {
            query = query.bind(format!("%{name}%"));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::View(e.to_string()))?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            configs.push(report_from_row(row)?);
        }
        configs.retain(|c| {
            filter
                .input_channel
                .as_ref()
                .map(|ch| c.channel_ids.iter().any(|x| x == ch))
                .unwrap_or(true)
        });

        let total = configs.len() as u64;
        let limit = if filter.limit == 0 { total.max(1) } else { filter.limit };
        let offset = filter.offset.min(total) as usize;
        let end = offset.saturating_add(limit as usize).min(configs.len());
        let items = configs.drain(offset..end).collect();

        Ok(Page {
            offset: filter.offset,
            limit,
            total,
            items,
        })
    }
}
