//! Canonicalizes raw score payloads. Every upstream field is optional; missing
//! or mistyped fields fall back to safe defaults instead of failing.

use serde_json::{Map, Value};

use super::cache::ResultCache;
use super::record::{
    BreakdownEntry, DormantSignal, EntityFlags, Explain, Features, NeighborAverage, NeighborStats,
    ScoreRecord, normalize_id,
};

/// Wallet-age risk decays linearly to zero over this many days.
const WALLET_AGE_HORIZON_DAYS: f64 = 365.0 * 2.0;

const SANCTION_DELTA: f64 = 40.0;

const FACTOR_WEIGHTS: [(&str, f64); 7] = [
    ("OFAC", SANCTION_DELTA),
    ("OFAC/sanctions list match", SANCTION_DELTA),
    ("sanctioned Counterparty", SANCTION_DELTA),
    ("fan In High", 9.0),
    ("shortest Path To Sanctioned", 6.0),
    ("burst Anomaly", 0.0),
    ("known Mixer Proximity", 0.0),
];

/// JavaScript-style truthiness, except that an empty list counts as "no hits".
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|n| n.is_finite())
}

fn reason_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(text)) if !text.is_empty() => vec![text.clone()],
        _ => Vec::new(),
    }
}

fn mentions_sanctions(reasons: &[String]) -> bool {
    reasons.iter().any(|reason| {
        let reason = reason.to_lowercase();
        reason.contains("ofac") || reason.contains("sanction")
    })
}

fn factor_weight(label: &str) -> f64 {
    FACTOR_WEIGHTS
        .iter()
        .find_map(|(name, weight)| (*name == label).then_some(*weight))
        .unwrap_or(0.0)
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

pub fn wallet_age_risk(age_days: f64) -> f64 {
    clamp_unit(1.0 - (age_days / WALLET_AGE_HORIZON_DAYS).min(1.0))
}

/// Upstream breakdown when present, otherwise derived from the reasons with
/// the factor-weight table, strongest contribution first.
fn derive_breakdown(raw: &Map<String, Value>, reasons: &[String], blocked: bool) -> Vec<BreakdownEntry> {
    if let Some(Value::Array(entries)) = raw.get("breakdown") {
        let upstream = entries
            .iter()
            .filter_map(|entry| serde_json::from_value::<BreakdownEntry>(entry.clone()).ok())
            .collect::<Vec<_>>();
        if !upstream.is_empty() {
            return upstream;
        }
    }

    if reasons.is_empty() {
        return Vec::new();
    }

    let mut entries = reasons
        .iter()
        .map(|label| BreakdownEntry {
            label: label.clone(),
            delta: factor_weight(label),
        })
        .collect::<Vec<_>>();
    if blocked && !mentions_sanctions(reasons) {
        entries.insert(
            0,
            BreakdownEntry {
                label: "sanctioned Counterparty".to_owned(),
                delta: SANCTION_DELTA,
            },
        );
    }
    entries.sort_by(|a, b| b.delta.total_cmp(&a.delta));
    entries
}

fn fold_neighbor_stats(explain: &mut Explain, stats: &NeighborStats) {
    explain.neighbors_dormant = Some(DormantSignal {
        inactive_ratio: stats.inactive_ratio,
        n: stats.n,
        avg_inactive_age: stats.avg_inactive_age,
    });
    explain.neighbors_avg_tx = stats.avg_tx.map(|value| NeighborAverage { value, n: stats.n });
    explain.neighbors_avg_age = stats.avg_days.map(|value| NeighborAverage { value, n: stats.n });
    explain.sparse_neighborhood = stats.sparse_neighborhood;
}

pub fn normalize(raw: &Value, cache: &ResultCache) -> ScoreRecord {
    let empty = Map::new();
    let fields = raw.as_object().unwrap_or(&empty);
    let field = |name: &str| fields.get(name);

    let id = normalize_id(
        field("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .or_else(|| field("address").and_then(Value::as_str))
            .unwrap_or_default(),
    );
    let network = field("network")
        .and_then(Value::as_str)
        .filter(|network| !network.is_empty())
        .unwrap_or(cache.network())
        .to_owned();

    let server_score = number(field("risk_score"));
    let score = server_score
        .or_else(|| number(field("score")))
        .unwrap_or(0.0)
        .clamp(0.0, 100.0);
    let blocked = truthy(field("block"))
        || server_score == Some(100.0)
        || truthy(field("sanctionHits"));

    let raw_reasons = reason_list(field("reasons").or_else(|| field("risk_factors")));
    let mut explain = Explain::default();
    match field("explain") {
        Some(Value::Object(upstream)) => {
            explain.wallet_age_risk = number(upstream.get("walletAgeRisk")).map(clamp_unit);
            explain.reasons = reason_list(upstream.get("reasons"));
            explain.extra = upstream.clone();
            for known in ["ofacHit", "walletAgeRisk", "reasons"] {
                explain.extra.remove(known);
            }
        }
        _ => explain.reasons = raw_reasons.clone(),
    }

    explain.ofac_hit = truthy(field("sanctionHits"))
        || truthy(field("explain").and_then(|upstream| upstream.get("ofacHit")))
        || truthy(field("sanctioned"))
        || truthy(field("ofac"))
        || mentions_sanctions(&raw_reasons);

    let feats_field = |name: &str| field("feats").and_then(|feats| feats.get(name));
    let feats = Features {
        age_days: number(feats_field("ageDays")),
        mixer_taint: number(feats_field("mixerTaint")),
        risky_neighbor_ratio: number(
            feats_field("local").and_then(|local| local.get("riskyNeighborRatio")),
        ),
    };
    if explain.wallet_age_risk.is_none()
        && let Some(age_days) = feats.age_days.filter(|days| *days >= 0.0)
    {
        explain.wallet_age_risk = Some(wallet_age_risk(age_days));
    }

    let flag = |name: &str| truthy(field("flags").and_then(|flags| flags.get(name)));
    let flags = EntityFlags {
        custodian: flag("custodian"),
        cluster_risk: flag("clusterRisk"),
        dormant: flag("dormant"),
        mixer_link: flag("mixerLink"),
        platform_entity: flag("platformEntity"),
    };

    if let Some(stats) = cache.neighbor_stats(&id) {
        fold_neighbor_stats(&mut explain, stats);
    }

    let breakdown = derive_breakdown(fields, &raw_reasons, blocked);
    let label = field("label").and_then(Value::as_str).map(str::to_owned);

    ScoreRecord {
        id,
        network,
        score,
        blocked,
        explain,
        breakdown,
        feats,
        flags,
        label,
        raw: raw.clone(),
    }
}

/// Whether the graph overlay should draw the record as blocked. Broader than
/// `ScoreRecord::blocked`: any OFAC evidence counts.
pub fn blocked_visual(record: &ScoreRecord) -> bool {
    record.blocked
        || record.explain.ofac_hit
        || number(record.raw.get("risk_score")) == Some(100.0)
        || record.raw.get("ofac") == Some(&Value::Bool(true))
}
