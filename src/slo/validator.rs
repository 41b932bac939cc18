//! SLO validation
//!
//! Two passes gate admission. The structural pass checks each document
//! against the `aegis.dev/v1` contract: required fields, value ranges,
//! duration shapes, at least one burn rule. The semantic pass looks at the
//! whole set: duplicate ids across files and compliance windows that are
//! narrower than a burn-policy window. Admission is all-or-nothing: any
//! error rejects the set.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::duration::{format_duration, parse_duration};
use super::{load_from_directory, Slo, SloWithFile, ValidationError, API_VERSION, KIND};

const ALLOWED_ACTIONS: [&str; 3] = ["ALLOW", "WARN", "BLOCK"];
const ALLOWED_SLI_TYPES: [&str; 2] = ["ratio", "latency_threshold"];

/// Validates loaded SLO sets
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate every SLO document under `dir`
    ///
    /// Returns the full error list; an empty list means the set is
    /// admissible.
    pub fn validate_directory(&self, dir: impl AsRef<Path>) -> Vec<ValidationError> {
        let (slos, mut errors) = load_from_directory(dir);

        for slo_with_file in &slos {
            errors.extend(self.validate_structure(&slo_with_file.file, &slo_with_file.slo));
        }

        errors.extend(self.validate_set(&slos));
        errors
    }

    /// Structural pass: per-document contract checks
    pub fn validate_structure(&self, file: &str, slo: &Slo) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if slo.api_version != API_VERSION {
            errors.push(ValidationError::new(
                file,
                "apiVersion",
                format!("expected {API_VERSION:?}, got {:?}", slo.api_version),
            ));
        }
        if slo.kind != KIND {
            errors.push(ValidationError::new(
                file,
                "kind",
                format!("expected {KIND:?}, got {:?}", slo.kind),
            ));
        }
        if slo.metadata.id.is_empty() {
            errors.push(ValidationError::new(
                file,
                "metadata.id",
                "required field is missing",
            ));
        }
        if slo.metadata.service.is_empty() {
            errors.push(ValidationError::new(
                file,
                "metadata.service",
                "required field is missing",
            ));
        }
        if slo.spec.environment.is_empty() {
            errors.push(ValidationError::new(
                file,
                "spec.environment",
                "required field is missing",
            ));
        }

        if !(slo.spec.objective > 0.0 && slo.spec.objective < 1.0) {
            errors.push(ValidationError::new(
                file,
                "spec.objective",
                format!(
                    "objective must be in (0, 1) exclusive, got {}",
                    slo.spec.objective
                ),
            ));
        }

        check_duration(&mut errors, file, "spec.complianceWindow", &slo.spec.compliance_window);
        check_duration(
            &mut errors,
            file,
            "spec.evaluationInterval",
            &slo.spec.evaluation_interval,
        );

        if !ALLOWED_SLI_TYPES.contains(&slo.spec.sli.sli_type.as_str()) {
            errors.push(ValidationError::new(
                file,
                "spec.sli.type",
                format!(
                    "must be one of {ALLOWED_SLI_TYPES:?}, got {:?}",
                    slo.spec.sli.sli_type
                ),
            ));
        }
        if slo.spec.sli.good.prometheus_query.is_empty() {
            errors.push(ValidationError::new(
                file,
                "spec.sli.good.prometheusQuery",
                "required field is missing",
            ));
        }
        if slo.spec.sli.total.prometheus_query.is_empty() {
            errors.push(ValidationError::new(
                file,
                "spec.sli.total.prometheusQuery",
                "required field is missing",
            ));
        }

        if slo.spec.burn_policy.rules.is_empty() {
            errors.push(ValidationError::new(
                file,
                "spec.burnPolicy.rules",
                "at least one burn rule is required",
            ));
        }
        for (i, rule) in slo.spec.burn_policy.rules.iter().enumerate() {
            let prefix = format!("spec.burnPolicy.rules[{i}]");
            if rule.name.is_empty() {
                errors.push(ValidationError::new(
                    file,
                    format!("{prefix}.name"),
                    "required field is missing",
                ));
            }
            check_duration(
                &mut errors,
                file,
                &format!("{prefix}.shortWindow"),
                &rule.short_window,
            );
            check_duration(
                &mut errors,
                file,
                &format!("{prefix}.longWindow"),
                &rule.long_window,
            );
            if rule.threshold < 0.0 {
                errors.push(ValidationError::new(
                    file,
                    format!("{prefix}.threshold"),
                    format!("threshold must be >= 0, got {}", rule.threshold),
                ));
            }
            if !ALLOWED_ACTIONS.contains(&rule.action.as_str()) {
                errors.push(ValidationError::new(
                    file,
                    format!("{prefix}.action"),
                    format!("must be one of {ALLOWED_ACTIONS:?}, got {:?}", rule.action),
                ));
            }
        }

        if slo.spec.gating.min_data_points < 0 {
            errors.push(ValidationError::new(
                file,
                "spec.gating.minDataPoints",
                format!("must be >= 0, got {}", slo.spec.gating.min_data_points),
            ));
        }
        if !slo.spec.gating.staleness_limit.is_empty() {
            check_duration(
                &mut errors,
                file,
                "spec.gating.stalenessLimit",
                &slo.spec.gating.staleness_limit,
            );
        }

        errors
    }

    /// Semantic pass: whole-set rules
    pub fn validate_set(&self, slos: &[SloWithFile]) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut id_seen: HashMap<&str, &str> = HashMap::new();
        for slo_with_file in slos {
            let id = slo_with_file.slo.metadata.id.as_str();
            if id.is_empty() {
                continue;
            }
            match id_seen.get(id) {
                Some(prev_file) => errors.push(ValidationError::new(
                    &slo_with_file.file,
                    "metadata.id",
                    format!("duplicate ID {:?} (also in {})", id, base_name(prev_file)),
                )),
                None => {
                    id_seen.insert(id, slo_with_file.file.as_str());
                }
            }

            errors.extend(validate_compliance_window(
                &slo_with_file.file,
                &slo_with_file.slo,
            ));
        }

        errors
    }
}

fn check_duration(errors: &mut Vec<ValidationError>, file: &str, path: &str, value: &str) {
    if let Err(err) = parse_duration(value) {
        errors.push(ValidationError::new(file, path, err.to_string()));
    }
}

/// The compliance window must cover every burn-policy window
pub(crate) fn validate_compliance_window(file: &str, slo: &Slo) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let compliance = match parse_duration(&slo.spec.compliance_window) {
        Ok(d) => d,
        Err(err) => {
            errors.push(ValidationError::new(
                file,
                "spec.complianceWindow",
                err.to_string(),
            ));
            return errors;
        }
    };

    let mut max_policy_window: Duration = compliance;
    for (i, rule) in slo.spec.burn_policy.rules.iter().enumerate() {
        match parse_duration(&rule.short_window) {
            Ok(d) => max_policy_window = max_policy_window.max(d),
            Err(err) => {
                errors.push(ValidationError::new(
                    file,
                    format!("spec.burnPolicy.rules[{i}].shortWindow"),
                    err.to_string(),
                ));
                continue;
            }
        }
        match parse_duration(&rule.long_window) {
            Ok(d) => max_policy_window = max_policy_window.max(d),
            Err(err) => {
                errors.push(ValidationError::new(
                    file,
                    format!("spec.burnPolicy.rules[{i}].longWindow"),
                    err.to_string(),
                ));
            }
        }
    }

    if compliance < max_policy_window {
        errors.push(ValidationError::new(
            file,
            "spec.complianceWindow",
            format!(
                "complianceWindow ({}) must be >= max burn policy window ({})",
                slo.spec.compliance_window,
                format_duration(max_policy_window)
            ),
        ));
    }

    errors
}

fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}
