// SPDX-License-Identifier: MIT

//! Unit catalog used for numeric conversion and display
//!
//! Every unit is expressed relative to the base unit of its measure as
//! `base = value * factor + offset`, which also covers affine scales such as
//! temperature.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Conversion and naming of measurement units
pub trait UnitCatalog: Send + Sync {
    /// Convert `value` between two units of the same measure
    fn convert(&self, value: f64, from: &str, to: &str) -> Option<f64>;

    /// Singular or plural label for `unit`, chosen by `value`
    fn describe(&self, unit: &str, value: f64) -> Option<String>;

    /// Unit identifiers grouped by measure
    fn list(&self) -> BTreeMap<String, Vec<String>>;
}

struct UnitDef {
    abbr: &'static str,
    measure: &'static str,
    singular: &'static str,
    plural: &'static str,
    factor: f64,
    offset: f64,
}

const fn unit(
    abbr: &'static str,
    measure: &'static str,
    singular: &'static str,
    plural: &'static str,
    factor: f64,
) -> UnitDef {
    UnitDef {
        abbr,
        measure,
        singular,
        plural,
        factor,
        offset: 0.0,
    }
}

static UNITS: Lazy<Vec<UnitDef>> = Lazy::new(|| {
    vec![
        // length, base metre
        unit("mm", "length", "Millimeter", "Millimeters", 0.001),
        unit("cm", "length", "Centimeter", "Centimeters", 0.01),
        unit("m", "length", "Meter", "Meters", 1.0),
        unit("km", "length", "Kilometer", "Kilometers", 1000.0),
        unit("in", "length", "Inch", "Inches", 0.0254),
        unit("ft", "length", "Foot", "Feet", 0.3048),
        unit("yd", "length", "Yard", "Yards", 0.9144),
        unit("mi", "length", "Mile", "Miles", 1609.344),
        // mass, base gram
        unit("mg", "mass", "Milligram", "Milligrams", 0.001),
        unit("g", "mass", "Gram", "Grams", 1.0),
        unit("kg", "mass", "Kilogram", "Kilograms", 1000.0),
        unit("oz", "mass", "Ounce", "Ounces", 28.349523125),
        unit("lb", "mass", "Pound", "Pounds", 453.59237),
        unit("t", "mass", "Metric Tonne", "Metric Tonnes", 1_000_000.0),
        // volume, base litre
        unit("ml", "volume", "Millilitre", "Millilitres", 0.001),
        unit("l", "volume", "Litre", "Litres", 1.0),
        unit("m3", "volume", "Cubic meter", "Cubic meters", 1000.0),
        unit("tsp", "volume", "Teaspoon", "Teaspoons", 0.00492892159375),
        unit("Tbs", "volume", "Tablespoon", "Tablespoons", 0.01478676478125),
        unit("fl-oz", "volume", "Fluid Ounce", "Fluid Ounces", 0.0295735295625),
        unit("cup", "volume", "Cup", "Cups", 0.2365882365),
        unit("qt", "volume", "Quart", "Quarts", 0.946352946),
        unit("gal", "volume", "Gallon", "Gallons", 3.785411784),
        // temperature, base kelvin
        UnitDef {
            abbr: "C",
            measure: "temperature",
            singular: "degree Celsius",
            plural: "degrees Celsius",
            factor: 1.0,
            offset: 273.15,
        },
        UnitDef {
            abbr: "F",
            measure: "temperature",
            singular: "degree Fahrenheit",
            plural: "degrees Fahrenheit",
            factor: 5.0 / 9.0,
            offset: 273.15 - 32.0 * 5.0 / 9.0,
        },
        unit("K", "temperature", "degree Kelvin", "degrees Kelvin", 1.0),
        // time, base second
        unit("ms", "time", "Millisecond", "Milliseconds", 0.001),
        unit("s", "time", "Second", "Seconds", 1.0),
        unit("min", "time", "Minute", "Minutes", 60.0),
        unit("h", "time", "Hour", "Hours", 3600.0),
        unit("d", "time", "Day", "Days", 86_400.0),
        unit("week", "time", "Week", "Weeks", 604_800.0),
        // speed, base metre per second
        unit("m/s", "speed", "Metre per second", "Metres per second", 1.0),
        unit("km/h", "speed", "Kilometre per hour", "Kilometres per hour", 1.0 / 3.6),
        unit("mph", "speed", "Mile per hour", "Miles per hour", 0.44704),
        unit("knot", "speed", "Knot", "Knots", 1852.0 / 3600.0),
        unit("ft/s", "speed", "Foot per second", "Feet per second", 0.3048),
        // pressure, base pascal
        unit("Pa", "pressure", "pascal", "pascals", 1.0),
        unit("hPa", "pressure", "hectopascal", "hectopascals", 100.0),
        unit("kPa", "pressure", "kilopascal", "kilopascals", 1000.0),
        unit("bar", "pressure", "bar", "bar", 100_000.0),
        unit("psi", "pressure", "pound per square inch", "pounds per square inch", 6894.757293168),
        // energy, base joule
        unit("J", "energy", "Joule", "Joules", 1.0),
        unit("kJ", "energy", "Kilojoule", "Kilojoules", 1000.0),
        unit("Wh", "energy", "Watt-hour", "Watt-hours", 3600.0),
        unit("kWh", "energy", "Kilowatt-hour", "Kilowatt-hours", 3_600_000.0),
        // power, base watt
        unit("W", "power", "Watt", "Watts", 1.0),
        unit("kW", "power", "Kilowatt", "Kilowatts", 1000.0),
        unit("MW", "power", "Megawatt", "Megawatts", 1_000_000.0),
        // ratios
        unit("ppm", "partsPer", "Part-per Million", "Parts-per Million", 0.000001),
        unit("%", "partsPer", "Percent", "Percent", 0.01),
    ]
});

fn lookup(abbr: &str) -> Option<&'static UnitDef> {
    UNITS.iter().find(|u| u.abbr == abbr)
}

/// The built-in unit table
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnits;

impl UnitCatalog for StandardUnits {
    fn convert(&self, value: f64, from: &str, to: &str) -> Option<f64> {
        let from = lookup(from)?;
        let to = lookup(to)?;
        if from.measure != to.measure {
            return None;
        }
        let base = value * from.factor + from.offset;
        Some((base - to.offset) / to.factor)
    }

    fn describe(&self, unit: &str, value: f64) -> Option<String> {
        let def = lookup(unit)?;
        let label = if value == 1.0 { def.singular } else { def.plural };
        Some(label.to_string())
    }

    fn list(&self) -> BTreeMap<String, Vec<String>> {
        let mut measures: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for def in UNITS.iter() {
            measures
                .entry(def.measure.to_string())
                .or_default()
                .push(def.abbr.to_string());
        }
        measures
    }
}
