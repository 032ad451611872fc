use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;

pub const DATE_FIELDS: [&str; 4] = [
    "dateOfBirth",
    "dateOfInjury",
    "formFillingDate",
    "formReceiptDateAtClinic",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationIssue(String);

impl ValidationIssue {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Required output shape of the injury-form extraction. Leaf values are placeholders.
pub fn form_template() -> Value {
    let date = || json!({"day": "", "month": "", "year": ""});
    json!({
        "lastName": "",
        "firstName": "",
        "idNumber": "",
        "gender": "",
        "dateOfBirth": date(),
        "address": {
            "street": "",
            "houseNumber": "",
            "entrance": "",
            "apartment": "",
            "city": "",
            "postalCode": "",
            "poBox": ""
        },
        "landlinePhone": "",
        "mobilePhone": "",
        "jobType": "",
        "dateOfInjury": date(),
        "timeOfInjury": "",
        "accidentLocation": "",
        "accidentAddress": "",
        "accidentDescription": "",
        "injuredBodyPart": "",
        "signature": "",
        "formFillingDate": date(),
        "formReceiptDateAtClinic": date(),
        "medicalInstitutionFields": {
            "healthFundMember": "",
            "natureOfAccident": "",
            "medicalDiagnoses": ""
        }
    })
}

/// Dot-joined paths of every leaf under `value`. Non-objects have no paths.
pub fn key_paths(value: &Value) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();
    if let Value::Object(map) = value {
        collect_paths(map, "", &mut paths);
    }
    paths
}

fn collect_paths(map: &Map<String, Value>, prefix: &str, paths: &mut BTreeSet<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => collect_paths(nested, &path, paths),
            _ => {
                paths.insert(path);
            }
        }
    }
}

/// Compares the key-path shape of `payload` with `template` and checks the
/// id and date fields. An empty result means the payload is valid.
pub fn validate(payload: &Value, template: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let required = key_paths(template);
    let found = key_paths(payload);
    let missing: Vec<&str> = required.difference(&found).map(String::as_str).collect();
    let extra: Vec<&str> = found.difference(&required).map(String::as_str).collect();
    if !missing.is_empty() {
        issues.push(ValidationIssue::new(format!(
            "Missing keys/paths: {}",
            format_paths(&missing)
        )));
    }
    if !extra.is_empty() {
        issues.push(ValidationIssue::new(format!(
            "Unexpected extra keys/paths: {}",
            format_paths(&extra)
        )));
    }

    if let Value::Object(map) = payload {
        check_id_number(map, &mut issues);
        for field in DATE_FIELDS {
            if let Some(Value::Object(date)) = map.get(field) {
                check_date(date, field, &mut issues);
            }
        }
    }

    issues
}

fn format_paths(paths: &[&str]) -> String {
    let quoted: Vec<String> = paths.iter().map(|path| format!("'{path}'")).collect();
    format!("[{}]", quoted.join(", "))
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn is_digits(text: &str, width: usize) -> bool {
    text.len() == width && text.bytes().all(|byte| byte.is_ascii_digit())
}

fn check_id_number(map: &Map<String, Value>, issues: &mut Vec<ValidationIssue>) {
    let id_number = scalar_text(map.get("idNumber"));
    if !id_number.is_empty() && !is_digits(&id_number, 9) {
        issues.push(ValidationIssue::new(
            "idNumber must be exactly 9 digits (or empty).",
        ));
    }
}

fn check_date(date: &Map<String, Value>, label: &str, issues: &mut Vec<ValidationIssue>) {
    let parts = [("day", 2), ("month", 2), ("year", 4)];
    let values: Vec<(&str, usize, String)> = parts
        .iter()
        .map(|(name, width)| (*name, *width, scalar_text(date.get(*name))))
        .collect();

    if values.iter().all(|(_, _, value)| value.is_empty()) {
        return;
    }

    for (name, width, value) in values {
        if !value.is_empty() && !is_digits(&value, width) {
            issues.push(ValidationIssue::new(format!(
                "{label}.{name} must be {width} digits (or empty)."
            )));
        }
    }
}
