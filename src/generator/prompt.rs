//! Prompt construction for chat-based generators.

use chrono::{Datelike, NaiveDate};
use serde_json::json;

use super::PromptContext;
use crate::domain::{Subject, Target};

pub const SYSTEM_PROMPT: &str = "You are a sales coach. You analyse a salesperson's client \
portfolio and propose concrete next actions. Answer with JSON only.";

/// Eligible targets ordered by urgency, truncated to `limit`.
///
/// Ties keep the data source's order.
pub fn prioritize(eligible: &[Target], limit: usize) -> Vec<&Target> {
    let mut ranked: Vec<&Target> = eligible.iter().collect();
    ranked.sort_by_key(|t| std::cmp::Reverse(t.priority_score()));
    ranked.truncate(limit);
    ranked
}

/// Days in the month of `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .map_or(31, |last| last.day())
}

pub fn render_user_prompt(subject: &Subject, targets: &[&Target], context: &PromptContext) -> String {
    let as_of = context.as_of;
    let month_days = days_in_month(as_of);
    let expected_progress = f64::from(as_of.day()) / f64::from(month_days) * 100.0;

    let portfolio: Vec<serde_json::Value> = targets
        .iter()
        .map(|t| {
            json!({
                "target_id": t.target_id,
                "name": t.name,
                "monthly_sales": t.monthly_sales,
                "metrics": t.metrics,
                "open_claims": t.open_claims,
                "pickups": t.pickups,
                "memory_recs": context.prior_memory.get(&t.target_id).cloned().unwrap_or_default(),
            })
        })
        .collect();

    let payload = json!({
        "subject_id": subject.subject_id,
        "name": subject.name,
        "sales": subject.sales_context,
        "portfolio": portfolio,
    });

    format!(
        r#"CONTEXT
- Cut-off date: {as_of}
- Days in month: {month_days}, days remaining: {remaining}
- Expected progress: {expected_progress:.1}%

PRIORITIES
1. CRITICAL: high-value client with a sharp drop, inactivity or several open claims. Suggest a visit.
2. HIGH: important client with warning signs (sales under the 25th percentile for 2+ months, pickup completion under 70%, open claims). Suggest a meeting.
3. MEDIUM: early warning signs or a growth opportunity. Suggest a call.

MEMORY
Each client lists "memory_recs", the latest advice already given. Vary the action and angle for those clients and prefer clients without memory_recs.

TASK
Return EXACTLY {expected} recommendations, each for a DIFFERENT client taken from the portfolio below. Use the client's target_id verbatim.

OUTPUT (JSON only, no extra text):
{{"recommendations": [{{"priority": "CRITICAL|HIGH|MEDIUM", "target_id": "<id>", "target_name": "<name>", "action": "<one sentence>", "justification": "<one sentence with concrete figures>", "origin": "risk_analysis|operational_analysis|opportunity|prior_memory"}}]}}

DATA
{payload}"#,
        remaining = month_days - as_of.day(),
        expected = context.expected_count,
    )
}
