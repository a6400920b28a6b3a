//! Static property-to-unit table.
//!
//! Export column headers embed physical units resolved from this table; an
//! unknown property maps to an empty unit rather than an error so that
//! tracking a solver-specific property never blocks an export.

/// Unit string for a solver-reported property name.
pub fn unit_for(property: &str) -> &'static str {
    match property {
        "Voltages" | "VoltagesMagAng" => "volts",
        "VoltageMagnitude" => "volts",
        "VoltagePu" | "puVmagAngle" => "pu",
        "Currents" | "CurrentsMagAng" => "amps",
        "Powers" => "kVA",
        "kw" | "kW" | "Pmpp" => "kW",
        "kvar" | "kVar" => "kvar",
        "kva" | "kVA" | "kVABase" => "kVA",
        "pf" => "",
        "Losses" => "kW",
        "Frequency" => "Hz",
        "TapNumber" | "taps" => "",
        "Enabled" | "enabled" => "",
        "SocPercent" => "%",
        "DistanceKm" => "km",
        _ => "",
    }
}

/// Header label for one column: `label [unit]`, or bare label when the
/// property has no unit.
pub fn labeled_header(label: &str, property: &str) -> String {
    let unit = unit_for(property);
    if unit.is_empty() {
        label.to_string()
    } else {
        format!("{label} [{unit}]")
    }
}
