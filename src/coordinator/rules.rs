//! Declarative retention/load rules
//!
//! Rules are externally supplied, ordered configuration: per-datasource rules
//! first, then cluster defaults. Evaluation walks them in declaration order
//! and the first rule whose predicate matches the segment's interval decides
//! its fate for the cycle. No match falls through to the explicitly
//! configured default fate — never an implicit one.

use crate::common::DefaultFate;
use crate::segment::{Interval, Segment};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A retention/load rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Rule {
    /// Keep matching segments at the given per-tier replica counts, forever
    #[serde(rename_all = "camelCase")]
    LoadForever {
        tiered_replicants: BTreeMap<String, usize>,
    },
    /// Load segments whose interval is contained in the rule interval
    #[serde(rename_all = "camelCase")]
    LoadByInterval {
        interval: Interval,
        tiered_replicants: BTreeMap<String, usize>,
    },
    /// Load segments touching the trailing period ending now
    #[serde(rename_all = "camelCase")]
    LoadByPeriod {
        period: String,
        tiered_replicants: BTreeMap<String, usize>,
    },
    /// Drop every matching segment
    DropForever,
    /// Drop segments whose interval is contained in the rule interval
    #[serde(rename_all = "camelCase")]
    DropByInterval { interval: Interval },
    /// Drop segments that ended before the trailing period began
    #[serde(rename_all = "camelCase")]
    DropByPeriod { period: String },
}

impl Rule {
    /// Check the rule's own configuration (period syntax); malformed rules
    /// are excluded from evaluation and counted, they never abort a cycle.
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            Rule::LoadByPeriod { period, .. } | Rule::DropByPeriod { period } => {
                parse_period(period).map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Does this rule match a segment interval at time `now`?
    ///
    /// Period predicates are relative to `now`: a load period matches
    /// segments overlapping `[now - period, ∞)`, a drop period matches
    /// segments that ended at or before `now - period`. Assumes `validate`
    /// passed; an unparseable period matches nothing.
    pub fn applies(&self, interval: &Interval, now: DateTime<Utc>) -> bool {
        match self {
            Rule::LoadForever { .. } | Rule::DropForever => true,
            Rule::LoadByInterval { interval: rule, .. } | Rule::DropByInterval { interval: rule } => {
                rule.contains_interval(interval)
            }
            Rule::LoadByPeriod { period, .. } => match parse_period(period) {
                Ok(p) => interval.end > now - p,
                Err(_) => false,
            },
            Rule::DropByPeriod { period } => match parse_period(period) {
                Ok(p) => interval.end <= now - p,
                Err(_) => false,
            },
        }
    }

    /// The fate this rule assigns when it matches
    pub fn fate(&self) -> Fate {
        match self {
            Rule::LoadForever {
                tiered_replicants, ..
            }
            | Rule::LoadByInterval {
                tiered_replicants, ..
            }
            | Rule::LoadByPeriod {
                tiered_replicants, ..
            } => Fate::load(tiered_replicants.clone()),
            Rule::DropForever | Rule::DropByInterval { .. } | Rule::DropByPeriod { .. } => {
                Fate::Drop
            }
        }
    }
}

/// What the rules decided for one segment this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Fate {
    Load {
        tiered_replicants: BTreeMap<String, usize>,
    },
    Drop,
}

impl Fate {
    /// A load with zero replicas in every tier is a drop.
    pub fn load(tiered_replicants: BTreeMap<String, usize>) -> Fate {
        if tiered_replicants.values().all(|&count| count == 0) {
            Fate::Drop
        } else {
            Fate::Load { tiered_replicants }
        }
    }

    pub fn from_default(default: &DefaultFate) -> Fate {
        match default {
            DefaultFate::Drop => Fate::Drop,
            DefaultFate::Load { tiered_replicants } => Fate::load(tiered_replicants.clone()),
        }
    }
}

/// Evaluates ordered rules into per-segment fates
#[derive(Debug, Clone)]
pub struct RuleEngine {
    default_fate: Fate,
}

impl RuleEngine {
    pub fn new(default: &DefaultFate) -> Self {
        Self {
            default_fate: Fate::from_default(default),
        }
    }

    /// First matching rule wins; no match yields the configured default.
    pub fn evaluate(&self, segment: &Segment, now: DateTime<Utc>, rules: &[Rule]) -> Fate {
        for rule in rules {
            if rule.applies(&segment.interval, now) {
                return rule.fate();
            }
        }
        self.default_fate.clone()
    }
}

/// Parse an ISO-8601 period such as `P1D`, `PT6H`, `P2W` or `P1DT12H`.
///
/// Years and months use fixed lengths (365 and 30 days); retention windows
/// at that granularity do not need calendar arithmetic.
pub fn parse_period(s: &str) -> crate::Result<Duration> {
    let malformed = || crate::Error::MalformedRule(format!("invalid period: {}", s));

    let rest = s.strip_prefix('P').ok_or_else(malformed)?;
    if rest.is_empty() {
        return Err(malformed());
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) if t.is_empty() => (d, None),
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    fn parse_fields(
        source: &str,
        part: &str,
        units: &[(char, i64)],
        seconds: &mut i64,
    ) -> crate::Result<()> {
        let malformed = || crate::Error::MalformedRule(format!("invalid period: {}", source));
        let mut num = String::new();
        let mut last_unit_idx: Option<usize> = None;
        for c in part.chars() {
            if c.is_ascii_digit() {
                num.push(c);
                continue;
            }
            let idx = units
                .iter()
                .position(|(unit, _)| *unit == c)
                .ok_or_else(malformed)?;
            // units must appear in order, each at most once
            if num.is_empty() || last_unit_idx.is_some_and(|prev| idx <= prev) {
                return Err(malformed());
            }
            let value: i64 = num.parse().map_err(|_| malformed())?;
            *seconds += value * units[idx].1;
            num.clear();
            last_unit_idx = Some(idx);
        }
        if num.is_empty() {
            Ok(())
        } else {
            Err(malformed())
        }
    }

    let mut seconds: i64 = 0;
    parse_fields(
        s,
        date_part,
        &[
            ('Y', 365 * 86_400),
            ('M', 30 * 86_400),
            ('W', 7 * 86_400),
            ('D', 86_400),
        ],
        &mut seconds,
    )?;
    if let Some(time_part) = time_part {
        parse_fields(s, time_part, &[('H', 3_600), ('M', 60), ('S', 1)], &mut seconds)?;
    }

    if seconds == 0 {
        return Err(malformed());
    }
    Ok(Duration::seconds(seconds))
}
