//! Parameter sets: the complete resolved set and the sparse override layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rejected parameter write. Prior store state is unchanged when this is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("unknown parameter '{name}'")]
    UnknownParameter { name: String },

    #[error("invalid value '{value}' for {field}: {reason}")]
    InvalidValue {
        field: ParamField,
        value: String,
        reason: String,
    },

    #[error("{field} out of range: {value} ({constraint})")]
    OutOfDomain {
        field: ParamField,
        value: f64,
        constraint: &'static str,
    },

    #[error("malformed override document: {0}")]
    Malformed(String),
}

/// Names of every tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamField {
    MinGapPercent,
    MaxGapAge,
    VolumeConfirmation,
    VolumeMultiplier,
    MaxRiskPercent,
    TakeProfitRrRatio,
    StopLossAtrMultiplier,
    AtrPeriod,
    MinTimeframeConfluence,
}

impl ParamField {
    pub const ALL: [ParamField; 9] = [
        ParamField::MinGapPercent,
        ParamField::MaxGapAge,
        ParamField::VolumeConfirmation,
        ParamField::VolumeMultiplier,
        ParamField::MaxRiskPercent,
        ParamField::TakeProfitRrRatio,
        ParamField::StopLossAtrMultiplier,
        ParamField::AtrPeriod,
        ParamField::MinTimeframeConfluence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamField::MinGapPercent => "min_gap_percent",
            ParamField::MaxGapAge => "max_gap_age",
            ParamField::VolumeConfirmation => "volume_confirmation",
            ParamField::VolumeMultiplier => "volume_multiplier",
            ParamField::MaxRiskPercent => "max_risk_percent",
            ParamField::TakeProfitRrRatio => "take_profit_rr_ratio",
            ParamField::StopLossAtrMultiplier => "stop_loss_atr_multiplier",
            ParamField::AtrPeriod => "atr_period",
            ParamField::MinTimeframeConfluence => "min_timeframe_confluence",
        }
    }
}

impl fmt::Display for ParamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamField {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ParamError::UnknownParameter { name: s.to_string() })
    }
}

/// Complete, validated detection and risk parameters for one (symbol, timeframe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSet {
    /// Minimum gap size as a percent of the lower bound.
    pub min_gap_percent: f64,
    /// Candles after formation before a gap expires.
    pub max_gap_age: usize,
    /// Require the middle candle's volume to beat its recent average.
    pub volume_confirmation: bool,
    pub volume_multiplier: f64,
    /// Percent of equity risked per setup.
    pub max_risk_percent: f64,
    pub take_profit_rr_ratio: f64,
    pub stop_loss_atr_multiplier: f64,
    pub atr_period: usize,
    /// Distinct timeframes needed before a signal is emitted.
    pub min_timeframe_confluence: usize,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            min_gap_percent: 0.1,
            max_gap_age: 50,
            volume_confirmation: true,
            volume_multiplier: 1.0,
            max_risk_percent: 1.0,
            take_profit_rr_ratio: 2.0,
            stop_loss_atr_multiplier: 1.5,
            atr_period: 14,
            min_timeframe_confluence: 3,
        }
    }
}

impl ParameterSet {
    /// Check every field against its domain.
    pub fn validate(&self) -> Result<(), ParamError> {
        PartialParameterSet::from(self.clone()).validate()
    }

    /// Field value as f64, for display and hashing.
    pub fn get(&self, field: ParamField) -> f64 {
        match field {
            ParamField::MinGapPercent => self.min_gap_percent,
            ParamField::MaxGapAge => self.max_gap_age as f64,
            ParamField::VolumeConfirmation => {
                if self.volume_confirmation {
                    1.0
                } else {
                    0.0
                }
            }
            ParamField::VolumeMultiplier => self.volume_multiplier,
            ParamField::MaxRiskPercent => self.max_risk_percent,
            ParamField::TakeProfitRrRatio => self.take_profit_rr_ratio,
            ParamField::StopLossAtrMultiplier => self.stop_loss_atr_multiplier,
            ParamField::AtrPeriod => self.atr_period as f64,
            ParamField::MinTimeframeConfluence => self.min_timeframe_confluence as f64,
        }
    }
}

/// Sparse override layer: only the fields present take effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialParameterSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_gap_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gap_age: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_confirmation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_risk_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_rr_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_atr_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_timeframe_confluence: Option<usize>,
}

impl From<ParameterSet> for PartialParameterSet {
    fn from(p: ParameterSet) -> Self {
        Self {
            min_gap_percent: Some(p.min_gap_percent),
            max_gap_age: Some(p.max_gap_age),
            volume_confirmation: Some(p.volume_confirmation),
            volume_multiplier: Some(p.volume_multiplier),
            max_risk_percent: Some(p.max_risk_percent),
            take_profit_rr_ratio: Some(p.take_profit_rr_ratio),
            stop_loss_atr_multiplier: Some(p.stop_loss_atr_multiplier),
            atr_period: Some(p.atr_period),
            min_timeframe_confluence: Some(p.min_timeframe_confluence),
        }
    }
}

fn check_float(
    field: ParamField,
    value: Option<f64>,
    ok: impl Fn(f64) -> bool,
    constraint: &'static str,
) -> Result<(), ParamError> {
    match value {
        Some(v) if !v.is_finite() || !ok(v) => Err(ParamError::OutOfDomain {
            field,
            value: v,
            constraint,
        }),
        _ => Ok(()),
    }
}

fn check_count(
    field: ParamField,
    value: Option<usize>,
    min: usize,
    constraint: &'static str,
) -> Result<(), ParamError> {
    match value {
        Some(v) if v < min => Err(ParamError::OutOfDomain {
            field,
            value: v as f64,
            constraint,
        }),
        _ => Ok(()),
    }
}

fn parse_raw<T: FromStr>(field: ParamField, raw: &str) -> Result<T, ParamError>
where
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ParamError::InvalidValue {
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

impl PartialParameterSet {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validate the fields that are present.
    pub fn validate(&self) -> Result<(), ParamError> {
        check_float(
            ParamField::MinGapPercent,
            self.min_gap_percent,
            |v| v >= 0.0,
            ">= 0",
        )?;
        check_count(ParamField::MaxGapAge, self.max_gap_age, 1, ">= 1")?;
        check_float(
            ParamField::VolumeMultiplier,
            self.volume_multiplier,
            |v| v > 0.0,
            "> 0",
        )?;
        check_float(
            ParamField::MaxRiskPercent,
            self.max_risk_percent,
            |v| v > 0.0 && v <= 100.0,
            "in (0, 100]",
        )?;
        check_float(
            ParamField::TakeProfitRrRatio,
            self.take_profit_rr_ratio,
            |v| v > 0.0,
            "> 0",
        )?;
        check_float(
            ParamField::StopLossAtrMultiplier,
            self.stop_loss_atr_multiplier,
            |v| v > 0.0,
            "> 0",
        )?;
        check_count(ParamField::AtrPeriod, self.atr_period, 1, ">= 1")?;
        check_count(
            ParamField::MinTimeframeConfluence,
            self.min_timeframe_confluence,
            1,
            ">= 1",
        )?;
        Ok(())
    }

    /// Set one field from its textual name and value (CLI and file input).
    pub fn set_raw(&mut self, name: &str, raw: &str) -> Result<ParamField, ParamError> {
        let field: ParamField = name.parse()?;
        match field {
            ParamField::MinGapPercent => self.min_gap_percent = Some(parse_raw(field, raw)?),
            ParamField::MaxGapAge => self.max_gap_age = Some(parse_raw(field, raw)?),
            ParamField::VolumeConfirmation => {
                self.volume_confirmation = Some(parse_raw(field, raw)?)
            }
            ParamField::VolumeMultiplier => self.volume_multiplier = Some(parse_raw(field, raw)?),
            ParamField::MaxRiskPercent => self.max_risk_percent = Some(parse_raw(field, raw)?),
            ParamField::TakeProfitRrRatio => {
                self.take_profit_rr_ratio = Some(parse_raw(field, raw)?)
            }
            ParamField::StopLossAtrMultiplier => {
                self.stop_loss_atr_multiplier = Some(parse_raw(field, raw)?)
            }
            ParamField::AtrPeriod => self.atr_period = Some(parse_raw(field, raw)?),
            ParamField::MinTimeframeConfluence => {
                self.min_timeframe_confluence = Some(parse_raw(field, raw)?)
            }
        }
        Ok(field)
    }

    /// Fields present in this layer.
    pub fn fields(&self) -> Vec<ParamField> {
        ParamField::ALL
            .into_iter()
            .filter(|f| self.has(*f))
            .collect()
    }

    pub fn has(&self, field: ParamField) -> bool {
        match field {
            ParamField::MinGapPercent => self.min_gap_percent.is_some(),
            ParamField::MaxGapAge => self.max_gap_age.is_some(),
            ParamField::VolumeConfirmation => self.volume_confirmation.is_some(),
            ParamField::VolumeMultiplier => self.volume_multiplier.is_some(),
            ParamField::MaxRiskPercent => self.max_risk_percent.is_some(),
            ParamField::TakeProfitRrRatio => self.take_profit_rr_ratio.is_some(),
            ParamField::StopLossAtrMultiplier => self.stop_loss_atr_multiplier.is_some(),
            ParamField::AtrPeriod => self.atr_period.is_some(),
            ParamField::MinTimeframeConfluence => self.min_timeframe_confluence.is_some(),
        }
    }

    /// Overwrite `base` with every field present here.
    pub fn apply_to(&self, base: &mut ParameterSet) {
        if let Some(v) = self.min_gap_percent {
            base.min_gap_percent = v;
        }
        if let Some(v) = self.max_gap_age {
            base.max_gap_age = v;
        }
        if let Some(v) = self.volume_confirmation {
            base.volume_confirmation = v;
        }
        if let Some(v) = self.volume_multiplier {
            base.volume_multiplier = v;
        }
        if let Some(v) = self.max_risk_percent {
            base.max_risk_percent = v;
        }
        if let Some(v) = self.take_profit_rr_ratio {
            base.take_profit_rr_ratio = v;
        }
        if let Some(v) = self.stop_loss_atr_multiplier {
            base.stop_loss_atr_multiplier = v;
        }
        if let Some(v) = self.atr_period {
            base.atr_period = v;
        }
        if let Some(v) = self.min_timeframe_confluence {
            base.min_timeframe_confluence = v;
        }
    }

    /// Field-level merge: fields present in `newer` win.
    pub fn merged_with(&self, newer: &PartialParameterSet) -> PartialParameterSet {
        PartialParameterSet {
            min_gap_percent: newer.min_gap_percent.or(self.min_gap_percent),
            max_gap_age: newer.max_gap_age.or(self.max_gap_age),
            volume_confirmation: newer.volume_confirmation.or(self.volume_confirmation),
            volume_multiplier: newer.volume_multiplier.or(self.volume_multiplier),
            max_risk_percent: newer.max_risk_percent.or(self.max_risk_percent),
            take_profit_rr_ratio: newer.take_profit_rr_ratio.or(self.take_profit_rr_ratio),
            stop_loss_atr_multiplier: newer
                .stop_loss_atr_multiplier
                .or(self.stop_loss_atr_multiplier),
            atr_period: newer.atr_period.or(self.atr_period),
            min_timeframe_confluence: newer
                .min_timeframe_confluence
                .or(self.min_timeframe_confluence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let p = ParameterSet::default();
        assert!(p.validate().is_ok());
        assert_eq!(p.min_gap_percent, 0.1);
        assert_eq!(p.max_gap_age, 50);
        assert!(p.volume_confirmation);
        assert_eq!(p.atr_period, 14);
        assert_eq!(p.min_timeframe_confluence, 3);
    }

    #[test]
    fn field_names_roundtrip() {
        for f in ParamField::ALL {
            assert_eq!(f.as_str().parse::<ParamField>(), Ok(f));
        }
    }

    #[test]
    fn unknown_field_name_rejected() {
        let err = "gap_threshold".parse::<ParamField>().unwrap_err();
        assert_eq!(
            err,
            ParamError::UnknownParameter {
                name: "gap_threshold".into()
            }
        );
    }

    #[test]
    fn set_raw_parses_typed_values() {
        let mut p = PartialParameterSet::default();
        p.set_raw("min_gap_percent", "0.25").unwrap();
        p.set_raw("volume_confirmation", "false").unwrap();
        p.set_raw("atr_period", "21").unwrap();
        assert_eq!(p.min_gap_percent, Some(0.25));
        assert_eq!(p.volume_confirmation, Some(false));
        assert_eq!(p.atr_period, Some(21));
        assert_eq!(
            p.fields(),
            vec![
                ParamField::MinGapPercent,
                ParamField::VolumeConfirmation,
                ParamField::AtrPeriod
            ]
        );
    }

    #[test]
    fn set_raw_rejects_unparseable_value() {
        let mut p = PartialParameterSet::default();
        let err = p.set_raw("max_gap_age", "soon").unwrap_err();
        assert!(matches!(
            err,
            ParamError::InvalidValue {
                field: ParamField::MaxGapAge,
                ..
            }
        ));
        assert!(p.is_empty());
    }

    #[test]
    fn validate_rejects_out_of_domain() {
        let cases = [
            PartialParameterSet {
                min_gap_percent: Some(-0.1),
                ..Default::default()
            },
            PartialParameterSet {
                max_gap_age: Some(0),
                ..Default::default()
            },
            PartialParameterSet {
                max_risk_percent: Some(150.0),
                ..Default::default()
            },
            PartialParameterSet {
                stop_loss_atr_multiplier: Some(f64::NAN),
                ..Default::default()
            },
            PartialParameterSet {
                min_timeframe_confluence: Some(0),
                ..Default::default()
            },
        ];
        for case in cases {
            assert!(
                matches!(case.validate(), Err(ParamError::OutOfDomain { .. })),
                "{case:?} should be rejected"
            );
        }
    }

    #[test]
    fn apply_overwrites_only_present_fields() {
        let mut base = ParameterSet::default();
        let layer = PartialParameterSet {
            take_profit_rr_ratio: Some(3.0),
            ..Default::default()
        };
        layer.apply_to(&mut base);
        assert_eq!(base.take_profit_rr_ratio, 3.0);
        assert_eq!(base.min_gap_percent, 0.1);
    }

    #[test]
    fn merge_prefers_newer_fields() {
        let old = PartialParameterSet {
            min_gap_percent: Some(0.2),
            max_gap_age: Some(10),
            ..Default::default()
        };
        let new = PartialParameterSet {
            max_gap_age: Some(30),
            ..Default::default()
        };
        let merged = old.merged_with(&new);
        assert_eq!(merged.min_gap_percent, Some(0.2));
        assert_eq!(merged.max_gap_age, Some(30));
    }

    #[test]
    fn partial_deserialization_rejects_unknown_keys() {
        let err = serde_json::from_str::<PartialParameterSet>(r#"{"min_gap_pct": 0.2}"#);
        assert!(err.is_err());
        let ok: PartialParameterSet = serde_json::from_str(r#"{"min_gap_percent": 0.2}"#).unwrap();
        assert_eq!(ok.min_gap_percent, Some(0.2));
    }
}
