use crate::{CertificateSigningRequest, CertificateSigningRequestCondition, Patch, ResourceExt};
use chrono::{DateTime, SecondsFormat, Utc};

pub const APPROVED: &str = "Approved";
pub const DENIED: &str = "Denied";

pub fn conditions(csr: &CertificateSigningRequest) -> &[CertificateSigningRequestCondition] {
    csr.status
        .as_ref()
        .and_then(|status| status.conditions.as_deref())
        .unwrap_or_default()
}

fn has_true_condition(csr: &CertificateSigningRequest, type_: &str) -> bool {
    conditions(csr)
        .iter()
        .any(|c| c.type_ == type_ && c.status == "True")
}

pub fn is_approved(csr: &CertificateSigningRequest) -> bool {
    has_true_condition(csr, APPROVED)
}

pub fn is_denied(csr: &CertificateSigningRequest) -> bool {
    has_true_condition(csr, DENIED)
}

/// Builds a merge patch for the `approval` subresource that appends an `Approved` condition to
/// the request's existing conditions.
///
/// The patch is conditional on the request's resource version, so conditions written since the
/// request was observed are never overwritten.
pub fn approval_patch(
    csr: &CertificateSigningRequest,
    reason: &str,
    message: &str,
    timestamp: DateTime<Utc>,
) -> Result<Patch<serde_json::Value>, serde_json::Error> {
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut conditions = conditions(csr)
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    conditions.push(serde_json::json!({
        "type": APPROVED,
        "status": "True",
        "reason": reason,
        "message": message,
        "lastUpdateTime": timestamp,
        "lastTransitionTime": timestamp,
    }));

    let mut patch = serde_json::json!({
        "status": {
            "conditions": conditions,
        },
    });
    if let Some(version) = csr.resource_version() {
        patch["metadata"] = serde_json::json!({ "resourceVersion": version });
    }
    Ok(Patch::Merge(patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CertificateSigningRequestStatus, ObjectMeta};
    use chrono::TimeZone;

    fn mk_csr(conditions: Vec<(&str, &str)>) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some("csr-0".to_string()),
                ..Default::default()
            },
            status: Some(CertificateSigningRequestStatus {
                conditions: Some(
                    conditions
                        .into_iter()
                        .map(|(type_, status)| CertificateSigningRequestCondition {
                            type_: type_.to_string(),
                            status: status.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn reads_decision_conditions() {
        let pending = CertificateSigningRequest::default();
        assert!(!is_approved(&pending));
        assert!(!is_denied(&pending));

        let approved = mk_csr(vec![(APPROVED, "True")]);
        assert!(is_approved(&approved));
        assert!(!is_denied(&approved));

        let denied = mk_csr(vec![(DENIED, "True")]);
        assert!(!is_approved(&denied));
        assert!(is_denied(&denied));

        let failed = mk_csr(vec![("Failed", "True"), (APPROVED, "False")]);
        assert!(!is_approved(&failed));
        assert!(!is_denied(&failed));
    }

    #[test]
    fn approval_patch_keeps_existing_conditions() {
        let mut csr = mk_csr(vec![("Failed", "False")]);
        csr.metadata.resource_version = Some("42".to_string());
        let ts = Utc.with_ymd_and_hms(2020, 6, 1, 12, 30, 0).unwrap();
        let Patch::Merge(value) = approval_patch(&csr, "AutoApproved", "approved", ts).unwrap()
        else {
            panic!("expected a merge patch");
        };
        assert_eq!(
            value,
            serde_json::json!({
                "metadata": {
                    "resourceVersion": "42",
                },
                "status": {
                    "conditions": [
                        { "type": "Failed", "status": "False" },
                        {
                            "type": "Approved",
                            "status": "True",
                            "reason": "AutoApproved",
                            "message": "approved",
                            "lastUpdateTime": "2020-06-01T12:30:00Z",
                            "lastTransitionTime": "2020-06-01T12:30:00Z",
                        },
                    ],
                },
            })
        );
    }

    #[test]
    fn approval_patch_without_resource_version() {
        let csr = mk_csr(vec![]);
        let Patch::Merge(value) = approval_patch(&csr, "AutoApproved", "approved", Utc::now())
            .unwrap()
        else {
            panic!("expected a merge patch");
        };
        assert!(value.get("metadata").is_none());
        assert_eq!(value["status"]["conditions"][0]["type"], APPROVED);
    }
}
