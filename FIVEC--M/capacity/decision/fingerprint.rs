use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::model::{CapacityError, DecisionResult, Guardrails, Scores, Srt};

const ID_PREFIX: &str = "dec_";
const ID_HEX_LEN: usize = 24;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    loop_code: &'a str,
    indicator: &'a str,
    scores: &'a Scores,
    srt: &'a Srt,
    guardrails: &'a Guardrails,
}

/// Content-addressed decision id over loop, indicator, scores, SRT, and guardrails.
pub fn decision_id(
    loop_code: &str,
    indicator: &str,
    scores: &Scores,
    srt: &Srt,
    guardrails: &Guardrails,
) -> Result<String, CapacityError> {
    let bytes = stable_json_bytes(&FingerprintInput {
        loop_code,
        indicator,
        scores,
        srt,
        guardrails,
    })
    .map_err(|err| CapacityError::Encoding(err.to_string()))?;
    let digest = format!("{:x}", Sha256::digest(&bytes));
    Ok(format!("{ID_PREFIX}{}", &digest[..ID_HEX_LEN]))
}

/// Recomputes the fingerprint of an existing decision.
pub fn recompute(decision: &DecisionResult) -> Result<String, CapacityError> {
    decision_id(
        &decision.loop_code,
        &decision.indicator,
        &decision.scores,
        &decision.srt,
        &decision.guardrails,
    )
}

/// Returns true when the stored id matches the decision's content.
pub fn verify(decision: &DecisionResult) -> Result<bool, CapacityError> {
    Ok(recompute(decision)? == decision.decision_id)
}

/// JSON encoding with object keys sorted at every depth.
pub fn stable_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let raw = serde_json::to_value(value)?;
    serde_json::to_vec(&sort_keys(raw))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cadence, Capacity};
    use serde_json::json;

    fn inputs() -> (Scores, Srt, Guardrails) {
        let mut scores = Scores::default();
        *scores.get_mut(Capacity::Responsive) = 0.61;
        (
            scores,
            Srt {
                cadence: Cadence::Daily,
                horizon: "P14D".into(),
            },
            Guardrails {
                timebox_days: 14,
                caps: vec!["timebox_14d".into()],
                cool_down_ms: 10_800_000,
            },
        )
    }

    #[test]
    fn stable_bytes_sort_nested_keys() {
        let value = json!({ "z": 1, "a": { "d": 4, "b": 2 }, "arr": [{ "k2": 2, "k1": 1 }] });
        let text = String::from_utf8(stable_json_bytes(&value).unwrap()).unwrap();
        assert_eq!(text, r#"{"a":{"b":2,"d":4},"arr":[{"k1":1,"k2":2}],"z":1}"#);
    }

    #[test]
    fn id_is_stable_and_prefixed() {
        let (scores, srt, guardrails) = inputs();
        let first = decision_id("MES-L03", "beds", &scores, &srt, &guardrails).unwrap();
        let second = decision_id("MES-L03", "beds", &scores, &srt, &guardrails).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("dec_"));
        assert_eq!(first.len(), ID_PREFIX.len() + ID_HEX_LEN);
    }

    #[test]
    fn id_changes_with_any_input() {
        let (scores, srt, mut guardrails) = inputs();
        let base = decision_id("MES-L03", "beds", &scores, &srt, &guardrails).unwrap();
        assert_ne!(
            base,
            decision_id("MES-L04", "beds", &scores, &srt, &guardrails).unwrap()
        );
        guardrails.caps.push("overtime_cap".into());
        assert_ne!(
            base,
            decision_id("MES-L03", "beds", &scores, &srt, &guardrails).unwrap()
        );
    }
}
