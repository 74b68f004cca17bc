// src/agents/parser.rs — Parse generator output into hypotheses
//
// Format, one block per hypothesis:
//
//   HYPOTHESIS: <title>
//   STATEMENT: <one paragraph>
//   MECHANISM: <how it works>
//   OUTCOME: <metric> = <value> <unit>
//   EVIDENCE: <supporting data>
//   VALIDATION: <test step>
//   RISK: <risk>
//   PARAM: <name> = <number>
//
// Lines without a known key continue the previous STATEMENT or MECHANISM.

use crate::core::types::{AgentSource, Hypothesis, PredictedOutcome};

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Statement,
    Mechanism,
    Other,
}

#[derive(Default)]
struct Draft {
    title: String,
    statement: String,
    mechanism: String,
    outcomes: Vec<PredictedOutcome>,
    evidence: Vec<String>,
    validation: Vec<String>,
    risks: Vec<String>,
    params: Vec<(String, f64)>,
}

impl Draft {
    fn into_hypothesis(self, agent_id: &str, source: AgentSource) -> Option<Hypothesis> {
        let title = self.title.trim();
        let statement = self.statement.trim();
        if title.is_empty() || statement.is_empty() {
            return None;
        }
        let mut h = Hypothesis::new(agent_id, source, title, statement);
        h.mechanism = self.mechanism.trim().to_string();
        h.predicted_outcomes = self.outcomes;
        h.supporting_evidence = self.evidence;
        h.validation_plan = self.validation;
        h.risks = self.risks;
        h.parameters = self.params.into_iter().collect();
        Some(h)
    }
}

fn split_key(line: &str) -> Option<(String, &str)> {
    let (key, rest) = line.split_once(':')?;
    let key = key.trim().trim_start_matches(['-', '*', '#']).trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    Some((key.to_ascii_uppercase(), rest.trim()))
}

/// "cell efficiency = 33.5 %" → (metric, value, unit)
pub(crate) fn parse_outcome(text: &str) -> Option<PredictedOutcome> {
    let (metric, rest) = text.split_once('=')?;
    let rest = rest.trim();
    let number_end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(rest.len());
    let value: f64 = rest[..number_end].parse().ok()?;
    let metric = metric.trim();
    if metric.is_empty() {
        return None;
    }
    Some(PredictedOutcome {
        metric: metric.to_string(),
        value,
        unit: rest[number_end..].trim().to_string(),
    })
}

pub(crate) fn parse_param(text: &str) -> Option<(String, f64)> {
    let (name, value) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    let value: f64 = value.trim().parse().ok()?;
    value.is_finite().then(|| (name.to_string(), value))
}

fn append(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

/// Parse every well-formed block. Blocks without a title or statement are
/// skipped, as are OUTCOME/PARAM lines that do not parse.
pub fn parse_hypotheses(text: &str, agent_id: &str, source: AgentSource) -> Vec<Hypothesis> {
    let mut out = Vec::new();
    let mut current: Option<Draft> = None;
    let mut field = Field::Other;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let keyed = split_key(line);
        if let Some((key, value)) = &keyed {
            if key == "HYPOTHESIS" {
                if let Some(h) = current.take().and_then(|d| d.into_hypothesis(agent_id, source)) {
                    out.push(h);
                }
                current = Some(Draft {
                    title: value.to_string(),
                    ..Draft::default()
                });
                field = Field::Other;
                continue;
            }
        }

        let Some(draft) = current.as_mut() else {
            continue;
        };

        match keyed {
            Some((key, value)) => match key.as_str() {
                "STATEMENT" => {
                    append(&mut draft.statement, value);
                    field = Field::Statement;
                }
                "MECHANISM" => {
                    append(&mut draft.mechanism, value);
                    field = Field::Mechanism;
                }
                "OUTCOME" => {
                    draft.outcomes.extend(parse_outcome(value));
                    field = Field::Other;
                }
                "EVIDENCE" => {
                    draft.evidence.push(value.to_string());
                    field = Field::Other;
                }
                "VALIDATION" => {
                    draft.validation.push(value.to_string());
                    field = Field::Other;
                }
                "RISK" => {
                    draft.risks.push(value.to_string());
                    field = Field::Other;
                }
                "PARAM" => {
                    draft.params.extend(parse_param(value));
                    field = Field::Other;
                }
                _ => continue_field(draft, field, line),
            },
            None => continue_field(draft, field, line),
        }
    }

    if let Some(h) = current.and_then(|d| d.into_hypothesis(agent_id, source)) {
        out.push(h);
    }
    out
}

fn continue_field(draft: &mut Draft, field: Field, line: &str) {
    match field {
        Field::Statement => append(&mut draft.statement, line),
        Field::Mechanism => append(&mut draft.mechanism, line),
        Field::Other => {}
    }
}
