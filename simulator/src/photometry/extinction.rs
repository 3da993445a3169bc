//! Dust extinction in the survey filters.
//!
//! Extinction is carried per object as a colour excess E(B-V) and converted
//! to a magnitude offset in each filter with a fixed coefficient.

/// Standard E(B-V) to magnitude coefficients for the g, r, i and z bands.
pub const STANDARD_EBV_COEFFICIENTS: [(&str, f64); 4] =
    [("g", 3.793), ("r", 2.751), ("i", 2.086), ("z", 1.479)];

/// Looks up the standard coefficient for a filter name.
pub fn standard_ebv_coefficient(filter: &str) -> Option<f64> {
    STANDARD_EBV_COEFFICIENTS
        .iter()
        .find(|(name, _)| *name == filter)
        .map(|(_, coefficient)| *coefficient)
}

/// Magnitude dimming in a filter from the combined host and galactic colour excess.
pub fn extinction_magnitudes(host_ebv: f64, galactic_ebv: f64, coefficient: f64) -> f64 {
    (host_ebv + galactic_ebv) * coefficient
}
