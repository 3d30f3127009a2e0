use crate::error::ReconcileError;

/// The separator the district geometry uses inside names such as `종로1·2·3·4가동`.
pub const INTERPUNCT: char = '\u{00B7}';

/// Rewrites every `.` to the interpunct so registry names match geometry names.
pub fn normalize_name(name: &str) -> String {
    name.replace('.', &INTERPUNCT.to_string())
}

/// Appends `00` to an 8-digit administrative code. String concatenation keeps leading zeros.
pub fn pad_admin_code(code: &str) -> String {
    format!("{code}00")
}

/// True for the 8-digit codes used by the living-population feed.
pub fn is_short_admin_code(code: &str) -> bool {
    code.len() == 8 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Third token of `"<Province> <District> <Neighborhood>"`.
pub fn district_token(adm_nm: &str) -> Result<&str, ReconcileError> {
    adm_nm
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| ReconcileError::MalformedDistrictName {
            name: adm_nm.to_string(),
        })
}

/// Join key for the registered table, derived from a feature's `adm_nm`.
pub fn district_key(adm_nm: &str) -> Result<String, ReconcileError> {
    district_token(adm_nm).map(normalize_name)
}
