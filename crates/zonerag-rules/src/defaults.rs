use zonerag_core::error::RuleConfigurationError;

use crate::table::RuleTable;

/// Hard rules for SB9 lot splits and accessory dwelling units.
pub const DEFAULT_RULES_TOML: &str = r#"
[[strategy]]
name = "SB9"
description = "Senate Bill 9 lot split for residential parcels"
citation_topics = ["SB9 urban lot split requirements", "minimum lot size for lot splits"]

[[strategy.clause]]
attribute = "lot_size"
op = "gte"
value = 2400

[[strategy.clause]]
attribute = "existing_units"
op = "lt"
value = 2

[[strategy.clause]]
attribute = "zoning_label"
op = "prefix"
value = "R"

[[strategy]]
name = "ADU"
description = "Accessory dwelling unit on the same parcel"
citation_topics = ["accessory dwelling unit requirements"]

[[strategy.clause]]
attribute = "lot_size"
op = "gte"
value = 1200

[[strategy.clause]]
attribute = "zoning_label"
op = "any_of"
any_of = [{ op = "prefix", value = "R" }, { op = "contains", value = "residential" }]
"#;

impl RuleTable {
    pub fn builtin() -> Result<Self, RuleConfigurationError> {
        Self::from_toml_str(DEFAULT_RULES_TOML)
    }
}
