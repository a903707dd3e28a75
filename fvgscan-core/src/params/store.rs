//! Versioned override store and the layered resolver.
//!
//! Resolution order, most specific last:
//! global defaults → timeframe override → (symbol, timeframe) override.

use super::set::{ParamError, ParameterSet, PartialParameterSet};
use crate::domain::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where an override applies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverrideScope {
    Global,
    Timeframe(Timeframe),
    Symbol { symbol: String, timeframe: Timeframe },
}

impl fmt::Display for OverrideScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideScope::Global => write!(f, "global"),
            OverrideScope::Timeframe(tf) => write!(f, "timeframe {tf}"),
            OverrideScope::Symbol { symbol, timeframe } => write!(f, "{symbol} {timeframe}"),
        }
    }
}

/// Read/write access to parameter overrides.
pub trait OverrideStore {
    /// The override layer stored at `scope` (the full defaults for `Global`).
    fn get_overrides(&self, scope: &OverrideScope) -> PartialParameterSet;

    /// Merge `fields` into the layer at `scope`. Returns the new store version.
    fn set_override(
        &mut self,
        scope: OverrideScope,
        fields: PartialParameterSet,
    ) -> Result<u64, ParamError>;

    /// Drop the layer at `scope`. `Global` resets to built-in defaults.
    /// Returns false if there was nothing to remove.
    fn remove_override(&mut self, scope: &OverrideScope) -> bool;
}

/// Explicit, versioned parameter configuration.
///
/// Every successful write bumps `version`. A rejected write leaves the store
/// untouched, so resolution never observes a half-applied override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterStore {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    defaults: ParameterSet,
    #[serde(default)]
    timeframes: BTreeMap<Timeframe, PartialParameterSet>,
    #[serde(default)]
    symbols: BTreeMap<String, BTreeMap<Timeframe, PartialParameterSet>>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self {
            version: 0,
            defaults: ParameterSet::default(),
            timeframes: BTreeMap::new(),
            symbols: BTreeMap::new(),
        }
    }
}

impl ParameterStore {
    /// Create a store with validated global defaults.
    pub fn new(defaults: ParameterSet) -> Result<Self, ParamError> {
        defaults.validate()?;
        Ok(Self {
            defaults,
            ..Self::default()
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn defaults(&self) -> &ParameterSet {
        &self.defaults
    }

    pub fn resolver(&self) -> ParameterResolver<'_> {
        ParameterResolver {
            store: self,
            overlay: None,
        }
    }

    /// Shorthand for `self.resolver().resolve(..)`.
    pub fn resolve(&self, symbol: &str, timeframe: Timeframe) -> ParameterSet {
        self.resolver().resolve(symbol, timeframe)
    }

    /// Every scope that currently holds an override, in deterministic order.
    pub fn scopes(&self) -> Vec<OverrideScope> {
        let mut out: Vec<OverrideScope> = self
            .timeframes
            .keys()
            .map(|tf| OverrideScope::Timeframe(*tf))
            .collect();
        for (symbol, per_tf) in &self.symbols {
            for tf in per_tf.keys() {
                out.push(OverrideScope::Symbol {
                    symbol: symbol.clone(),
                    timeframe: *tf,
                });
            }
        }
        out
    }

    /// Parse a persisted override document, validating every layer.
    pub fn from_json(json: &str) -> Result<Self, ParamError> {
        let store: ParameterStore =
            serde_json::from_str(json).map_err(|e| ParamError::Malformed(e.to_string()))?;
        store.defaults.validate()?;
        for layer in store.timeframes.values() {
            layer.validate()?;
        }
        for layer in store.symbols.values().flat_map(|m| m.values()) {
            layer.validate()?;
        }
        Ok(store)
    }

    pub fn to_json(&self) -> String {
        // Plain structs and string-keyed maps: serialization is infallible.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl OverrideStore for ParameterStore {
    fn get_overrides(&self, scope: &OverrideScope) -> PartialParameterSet {
        match scope {
            OverrideScope::Global => self.defaults.clone().into(),
            OverrideScope::Timeframe(tf) => self.timeframes.get(tf).cloned().unwrap_or_default(),
            OverrideScope::Symbol { symbol, timeframe } => self
                .symbols
                .get(symbol)
                .and_then(|m| m.get(timeframe))
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn set_override(
        &mut self,
        scope: OverrideScope,
        fields: PartialParameterSet,
    ) -> Result<u64, ParamError> {
        fields.validate()?;
        match scope {
            OverrideScope::Global => {
                let mut defaults = self.defaults.clone();
                fields.apply_to(&mut defaults);
                defaults.validate()?;
                self.defaults = defaults;
            }
            OverrideScope::Timeframe(tf) => {
                let layer = self.timeframes.entry(tf).or_default();
                *layer = layer.merged_with(&fields);
            }
            OverrideScope::Symbol { symbol, timeframe } => {
                let layer = self
                    .symbols
                    .entry(symbol)
                    .or_default()
                    .entry(timeframe)
                    .or_default();
                *layer = layer.merged_with(&fields);
            }
        }
        self.version += 1;
        Ok(self.version)
    }

    fn remove_override(&mut self, scope: &OverrideScope) -> bool {
        let removed = match scope {
            OverrideScope::Global => {
                let changed = self.defaults != ParameterSet::default();
                self.defaults = ParameterSet::default();
                changed
            }
            OverrideScope::Timeframe(tf) => self.timeframes.remove(tf).is_some(),
            OverrideScope::Symbol { symbol, timeframe } => {
                let removed = self
                    .symbols
                    .get_mut(symbol)
                    .and_then(|m| m.remove(timeframe))
                    .is_some();
                if self.symbols.get(symbol).is_some_and(|m| m.is_empty()) {
                    self.symbols.remove(symbol);
                }
                removed
            }
        };
        if removed {
            self.version += 1;
        }
        removed
    }
}

/// Borrowed, read-only view of a store that produces effective parameters.
///
/// Resolution is pure and total: the defaults were validated on the way in, and
/// every override layer was validated at write time.
#[derive(Debug, Clone, Copy)]
pub struct ParameterResolver<'a> {
    store: &'a ParameterStore,
    overlay: Option<&'a PartialParameterSet>,
}

impl<'a> ParameterResolver<'a> {
    /// Apply a per-run override on top of every resolution.
    pub fn with_overlay(self, overlay: &'a PartialParameterSet) -> Self {
        Self {
            overlay: Some(overlay),
            ..self
        }
    }

    pub fn version(&self) -> u64 {
        self.store.version
    }

    pub fn resolve(&self, symbol: &str, timeframe: Timeframe) -> ParameterSet {
        let mut params = self.store.defaults.clone();
        if let Some(layer) = self.store.timeframes.get(&timeframe) {
            layer.apply_to(&mut params);
        }
        if let Some(layer) = self
            .store
            .symbols
            .get(symbol)
            .and_then(|m| m.get(&timeframe))
        {
            layer.apply_to(&mut params);
        }
        if let Some(overlay) = self.overlay {
            overlay.apply_to(&mut params);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamField;

    fn tf_scope(tf: Timeframe) -> OverrideScope {
        OverrideScope::Timeframe(tf)
    }

    fn sym_scope(symbol: &str, tf: Timeframe) -> OverrideScope {
        OverrideScope::Symbol {
            symbol: symbol.into(),
            timeframe: tf,
        }
    }

    #[test]
    fn empty_store_resolves_to_defaults() {
        let store = ParameterStore::default();
        assert_eq!(store.resolve("BTC/USDT", Timeframe::H1), ParameterSet::default());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn new_rejects_invalid_defaults() {
        let defaults = ParameterSet {
            max_gap_age: 0,
            ..Default::default()
        };
        assert!(matches!(
            ParameterStore::new(defaults),
            Err(ParamError::OutOfDomain {
                field: ParamField::MaxGapAge,
                ..
            })
        ));
    }

    #[test]
    fn precedence_is_field_level() {
        let mut store = ParameterStore::default();
        store
            .set_override(
                tf_scope(Timeframe::H1),
                PartialParameterSet {
                    min_gap_percent: Some(0.2),
                    max_gap_age: Some(20),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .set_override(
                sym_scope("ETH/USDT", Timeframe::H1),
                PartialParameterSet {
                    min_gap_percent: Some(0.3),
                    ..Default::default()
                },
            )
            .unwrap();

        let eth = store.resolve("ETH/USDT", Timeframe::H1);
        assert_eq!(eth.min_gap_percent, 0.3); // symbol+timeframe
        assert_eq!(eth.max_gap_age, 20); // timeframe
        assert_eq!(eth.atr_period, 14); // global

        let btc = store.resolve("BTC/USDT", Timeframe::H1);
        assert_eq!(btc.min_gap_percent, 0.2);

        let eth_4h = store.resolve("ETH/USDT", Timeframe::H4);
        assert_eq!(eth_4h, ParameterSet::default());
    }

    #[test]
    fn rejected_write_leaves_state_unchanged() {
        let mut store = ParameterStore::default();
        store
            .set_override(
                tf_scope(Timeframe::M5),
                PartialParameterSet {
                    max_gap_age: Some(10),
                    ..Default::default()
                },
            )
            .unwrap();
        let before = store.clone();

        let err = store.set_override(
            tf_scope(Timeframe::M5),
            PartialParameterSet {
                max_gap_age: Some(30),
                max_risk_percent: Some(-1.0),
                ..Default::default()
            },
        );
        assert!(err.is_err());
        assert_eq!(store, before);
    }

    #[test]
    fn version_bumps_on_successful_writes_only() {
        let mut store = ParameterStore::default();
        let v1 = store
            .set_override(
                OverrideScope::Global,
                PartialParameterSet {
                    atr_period: Some(10),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(v1, 1);
        assert!(store
            .set_override(
                OverrideScope::Global,
                PartialParameterSet {
                    atr_period: Some(0),
                    ..Default::default()
                },
            )
            .is_err());
        assert_eq!(store.version(), 1);
        assert!(!store.remove_override(&tf_scope(Timeframe::D1)));
        assert_eq!(store.version(), 1);
        assert!(store.remove_override(&OverrideScope::Global));
        assert_eq!(store.version(), 2);
        assert_eq!(store.defaults().atr_period, 14);
    }

    #[test]
    fn successive_writes_merge_into_layer() {
        let mut store = ParameterStore::default();
        let scope = sym_scope("SOL/USDT", Timeframe::M15);
        store
            .set_override(
                scope.clone(),
                PartialParameterSet {
                    min_gap_percent: Some(0.4),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .set_override(
                scope.clone(),
                PartialParameterSet {
                    volume_confirmation: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        let layer = store.get_overrides(&scope);
        assert_eq!(layer.min_gap_percent, Some(0.4));
        assert_eq!(layer.volume_confirmation, Some(false));
        assert_eq!(store.scopes(), vec![scope]);
    }

    #[test]
    fn removing_symbol_layer_restores_fallback() {
        let mut store = ParameterStore::default();
        let scope = sym_scope("SOL/USDT", Timeframe::M15);
        store
            .set_override(
                scope.clone(),
                PartialParameterSet {
                    min_gap_percent: Some(0.4),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.remove_override(&scope));
        assert!(store.scopes().is_empty());
        assert_eq!(store.resolve("SOL/USDT", Timeframe::M15).min_gap_percent, 0.1);
    }

    #[test]
    fn overlay_wins_over_all_layers() {
        let mut store = ParameterStore::default();
        store
            .set_override(
                sym_scope("BTC/USDT", Timeframe::M1),
                PartialParameterSet {
                    min_gap_percent: Some(0.3),
                    ..Default::default()
                },
            )
            .unwrap();
        let overlay = PartialParameterSet {
            min_gap_percent: Some(0.5),
            ..Default::default()
        };
        let resolved = store
            .resolver()
            .with_overlay(&overlay)
            .resolve("BTC/USDT", Timeframe::M1);
        assert_eq!(resolved.min_gap_percent, 0.5);
    }

    #[test]
    fn json_document_roundtrip() {
        let mut store = ParameterStore::default();
        store
            .set_override(
                sym_scope("BTC/USDT", Timeframe::H4),
                PartialParameterSet {
                    take_profit_rr_ratio: Some(3.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let json = store.to_json();
        assert!(json.contains("\"4h\""));
        let back = ParameterStore::from_json(&json).unwrap();
        assert_eq!(back, store);
    }

    #[test]
    fn json_document_with_unknown_parameter_rejected() {
        let json = r#"{"version": 3, "timeframes": {"1h": {"gap_size": 1.0}}}"#;
        assert!(matches!(
            ParameterStore::from_json(json),
            Err(ParamError::Malformed(_))
        ));
    }

    #[test]
    fn json_document_with_out_of_domain_value_rejected() {
        let json = r#"{"timeframes": {"1h": {"max_gap_age": 0}}}"#;
        assert!(matches!(
            ParameterStore::from_json(json),
            Err(ParamError::OutOfDomain { .. })
        ));
    }
}
