use super::*;
use crate::{
    csr::{USAGE_CLIENT_AUTH, USAGE_DIGITAL_SIGNATURE, USAGE_KEY_ENCIPHERMENT, WEBHOOK_SERVING_USAGES},
    test_util::{dns, mk_csr},
    WEBHOOK_SERVING_SIGNER_NAME,
};
use anyhow::anyhow;
use parking_lot::Mutex;
use rcgen::SanType;

#[derive(Default)]
struct Counting {
    allow: bool,
    fail: bool,
    calls: Mutex<usize>,
}

#[async_trait::async_trait]
impl Authorize for Counting {
    async fn is_authorized(&self, _: &Identity, _: &str) -> Result<bool> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(anyhow!("lookup failed"));
        }
        Ok(self.allow)
    }
}

fn approver(allow: bool) -> Approver<Counting> {
    Approver::new(
        WEBHOOK_SERVING_SIGNER_NAME,
        Counting {
            allow,
            ..Default::default()
        },
    )
}

fn mk_request(pem: String) -> CertificateRequest {
    CertificateRequest {
        signer_name: WEBHOOK_SERVING_SIGNER_NAME.to_string(),
        request: pem.into_bytes(),
        usages: WEBHOOK_SERVING_USAGES.iter().map(|u| u.to_string()).collect(),
        identity: Identity::new("system:serviceaccount:ns1:sa1"),
        state: RequestState::Pending,
    }
}

fn calls(approver: &Approver<Counting>) -> usize {
    *approver.authorizer().calls.lock()
}

#[tokio::test]
async fn approves_authorized_requests() {
    let approver = approver(true);
    let req = mk_request(mk_csr(None, vec![dns("svc1.ns1.cluster.local")]));
    let Decision::Approve(approval) = approver.decide(&req).await.unwrap() else {
        panic!("request must be approved");
    };
    assert_eq!(approval.signer_name, WEBHOOK_SERVING_SIGNER_NAME);
    assert_eq!(approval.reason, APPROVAL_REASON);
    assert_eq!(
        approval.message,
        "Automatically approved by cert-manager.io/webhook-serving"
    );
    assert_eq!(calls(&approver), 1);
}

#[tokio::test]
async fn decided_requests_are_never_reevaluated() {
    for state in [RequestState::Approved, RequestState::Denied] {
        let approver = approver(true);

        let req = CertificateRequest {
            state,
            ..mk_request(mk_csr(None, vec![dns("svc1.ns1.cluster.local")]))
        };
        assert_eq!(
            approver.decide(&req).await.unwrap(),
            Decision::NoOp(Skip::AlreadyDecided(state))
        );

        // Even garbage input is not looked at.
        let req = CertificateRequest {
            state,
            signer_name: "example.com/other".to_string(),
            request: b"garbage".to_vec(),
            ..Default::default()
        };
        assert_eq!(
            approver.decide(&req).await.unwrap(),
            Decision::NoOp(Skip::AlreadyDecided(state))
        );
        assert_eq!(calls(&approver), 0);
    }
}

#[tokio::test]
async fn ignores_other_signers() {
    let approver = approver(true);
    let req = CertificateRequest {
        signer_name: "kubernetes.io/kube-apiserver-client".to_string(),
        ..mk_request(mk_csr(None, vec![dns("svc1.ns1.cluster.local")]))
    };
    assert_eq!(
        approver.decide(&req).await.unwrap(),
        Decision::NoOp(Skip::UnknownSigner(
            "kubernetes.io/kube-apiserver-client".to_string()
        ))
    );
    assert_eq!(calls(&approver), 0);
}

#[tokio::test]
async fn leaves_malformed_requests_pending() {
    let approver = approver(true);
    let req = mk_request("not a request".to_string());
    assert!(matches!(
        approver.decide(&req).await.unwrap(),
        Decision::NoOp(Skip::Malformed(_))
    ));
    assert_eq!(calls(&approver), 0);
}

#[tokio::test]
async fn leaves_invalid_usages_pending() {
    let approver = approver(true);
    let pem = mk_csr(None, vec![dns("svc1.ns1.cluster.local")]);

    let missing = CertificateRequest {
        usages: vec![
            USAGE_DIGITAL_SIGNATURE.to_string(),
            USAGE_KEY_ENCIPHERMENT.to_string(),
        ],
        ..mk_request(pem.clone())
    };
    assert!(matches!(
        approver.decide(&missing).await.unwrap(),
        Decision::NoOp(Skip::Invalid(Rejection::Usages(_)))
    ));

    let extra = CertificateRequest {
        usages: WEBHOOK_SERVING_USAGES
            .iter()
            .chain(Some(&USAGE_CLIENT_AUTH))
            .map(|u| u.to_string())
            .collect(),
        ..mk_request(pem)
    };
    assert!(matches!(
        approver.decide(&extra).await.unwrap(),
        Decision::NoOp(Skip::Invalid(Rejection::Usages(_)))
    ));
    assert_eq!(calls(&approver), 0);
}

#[tokio::test]
async fn never_approves_ip_addresses() {
    let approver = approver(true);
    let req = mk_request(mk_csr(
        None,
        vec![
            dns("svc1.ns1.cluster.local"),
            SanType::IpAddress("10.1.2.3".parse().unwrap()),
        ],
    ));
    assert!(matches!(
        approver.decide(&req).await.unwrap(),
        Decision::NoOp(Skip::Invalid(Rejection::SubjectAltNames { .. }))
    ));
}

#[tokio::test]
async fn leaves_unauthorized_requests_pending() {
    let approver = approver(false);
    let req = mk_request(mk_csr(None, vec![dns("svc1.ns1.cluster.local")]));
    assert_eq!(
        approver.decide(&req).await.unwrap(),
        Decision::NoOp(Skip::Unauthorized)
    );
}

#[tokio::test]
async fn leaves_requests_without_names_pending() {
    let approver = approver(true);
    let req = mk_request(mk_csr(None, vec![]));
    assert_eq!(
        approver.decide(&req).await.unwrap(),
        Decision::NoOp(Skip::Unauthorized)
    );
    assert_eq!(calls(&approver), 0);
}

#[tokio::test]
async fn returns_authorization_errors() {
    let approver = Approver::new(
        WEBHOOK_SERVING_SIGNER_NAME,
        Counting {
            fail: true,
            ..Default::default()
        },
    );
    let req = mk_request(mk_csr(None, vec![dns("svc1.ns1.cluster.local")]));
    let error = approver
        .decide(&req)
        .await
        .expect_err("authorization errors must be returned");
    assert_eq!(error.to_string(), "lookup failed");
}
