#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod csr;
pub mod webhook;

pub use self::webhook::WebhookConfiguration;
pub use k8s_openapi::{
    api::{
        self,
        admissionregistration::v1::{
            MutatingWebhook, MutatingWebhookConfiguration, ServiceReference, ValidatingWebhook,
            ValidatingWebhookConfiguration, WebhookClientConfig,
        },
        certificates::v1::{
            CertificateSigningRequest, CertificateSigningRequestCondition,
            CertificateSigningRequestSpec, CertificateSigningRequestStatus,
        },
    },
    apimachinery,
    ByteString,
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    runtime::watcher,
    Client, Error,
};
