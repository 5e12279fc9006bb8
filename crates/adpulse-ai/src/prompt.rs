use crate::generator::InsightRequest;
use adpulse_common::types::Insights;
use anyhow::{Context, Result};

/// Builds the user prompt describing one alarm.
pub fn build_insight_prompt(request: &InsightRequest) -> Result<String> {
    let template = if request.locale == "zh-CN" {
        INSIGHT_PROMPT_ZH
    } else {
        INSIGHT_PROMPT_EN
    };

    Ok(template
        .replace("{{ALARM_DATA}}", &format_alarm(request))
        .replace("{{SCHEMA}}", INSIGHTS_SCHEMA))
}

/// Parses a model reply into [`Insights`].
///
/// Accepts a bare JSON object or one wrapped in a fenced code block, and
/// clamps root-cause confidences into `0.0..=1.0`.
pub fn parse_insights(content: &str) -> Result<Insights> {
    let json = extract_json_object(content)
        .ok_or_else(|| anyhow::anyhow!("no JSON object in model reply"))?;
    let mut insights: Insights =
        serde_json::from_str(json).context("model reply does not match the insights shape")?;
    for cause in &mut insights.root_causes {
        cause.confidence = cause.confidence.clamp(0.0, 1.0);
    }
    if insights.summary.trim().is_empty() {
        anyhow::bail!("model reply has an empty summary");
    }
    Ok(insights)
}

fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn format_alarm(request: &InsightRequest) -> String {
    let alarm = &request.alarm;
    let mut output = String::new();

    output.push_str("| Field | Value |\n");
    output.push_str("|-------|-------|\n");
    let rows = [
        ("Campaign", request.campaign.name.clone()),
        ("Daily budget (USD)", format!("{:.2}", request.campaign.daily_budget)),
        ("Metric", format!("{} ({})", alarm.metric_name, alarm.metric_id)),
        ("Monitor type", request.monitor.kind.as_str().to_string()),
        ("Sensitivity", request.monitor.sensitivity.to_string()),
        ("Current value", format!("{:.4}", alarm.current_value)),
        ("Expected value", format!("{:.4}", alarm.expected_value)),
        ("Deviation (%)", format!("{:+.1}", alarm.deviation_percent)),
        ("Severity", alarm.severity.to_string()),
        (
            "Estimated impact (USD)",
            alarm
                .estimated_impact_usd
                .map_or("N/A".to_string(), |v| format!("{v:.2}")),
        ),
        ("Triggered at", alarm.triggered_at.to_rfc3339()),
    ];
    for (field, value) in rows {
        output.push_str(&format!("| {field} | {value} |\n"));
    }

    output
}

const INSIGHTS_SCHEMA: &str = r#"{
  "summary": "string",
  "root_causes": [{"cause": "string", "confidence": 0.0}],
  "recommendations": [{"action": "string", "reasoning": "string", "expected_impact": "string", "confidence": "high|medium|low"}]
}"#;

const INSIGHT_PROMPT_EN: &str = r#"An advertising campaign metric has deviated from its expected baseline.

Alarm data:
{{ALARM_DATA}}

Explain the anomaly for a campaign manager. List up to 3 likely root causes with a confidence between 0 and 1, and up to 3 concrete recommendations.

Reply with a single JSON object and nothing else, using this shape:
{{SCHEMA}}
"#;

const INSIGHT_PROMPT_ZH: &str = r#"某广告活动的指标偏离了预期基线。

告警数据：
{{ALARM_DATA}}

请为投放经理解释该异常：列出最多 3 个可能的根因（置信度 0 到 1），以及最多 3 条具体的处理建议。

只返回一个 JSON 对象，不要输出其他内容，格式如下：
{{SCHEMA}}
"#;
