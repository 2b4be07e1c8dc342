mod common;

use appcontrol_simulator::adapters::PortableTrustVerifier;
use appcontrol_simulator::services::{TrustStatus, TrustVerifier};
use appcontrol_simulator::{SignerExtractor, SimulationError};
use common::*;
use std::sync::Arc;

fn extractor(verifier: Arc<CountingVerifier>) -> SignerExtractor {
    SignerExtractor::new(verifier)
}

#[test]
fn signed_image_yields_leaf_first_chain() {
    let dir = tempfile::tempdir().unwrap();
    let signer = TestSigner::contoso();
    let path = write_file(dir.path(), "app.exe", &sign_pe(build_pe(512, 1), &signer, &[]));

    let verifier = Arc::new(CountingVerifier::default());
    let records = extractor(Arc::clone(&verifier)).extract(&path).unwrap();

    assert_eq!(records.len(), 1);
    let chain = records[0].chain();
    let names: Vec<&str> = chain.elements().iter().map(|c| c.subject_cn()).collect();
    assert_eq!(
        names,
        vec!["Contoso Apps", "Contoso Code Signing PCA", "Contoso Root Authority"]
    );
    assert_eq!(chain.leaf().unwrap().tbs_hash(), signer.leaf_tbs());
    assert_eq!(chain.root().unwrap().tbs_hash(), signer.root_tbs());
    assert_eq!(records[0].signer_ekus(), vec![CODE_SIGNING_EKU.to_string()]);

    assert_eq!(verifier.opened(), 1);
    assert_eq!(verifier.closed(), 1);
}

#[test]
fn whql_signer_carries_ekus_and_program_name() {
    let dir = tempfile::tempdir().unwrap();
    let signer = TestSigner::whql(Some("Contoso OEM"));
    let path = write_file(dir.path(), "driver.sys", &sign_pe(build_pe(512, 3), &signer, &[]));

    let records = extractor(Arc::new(CountingVerifier::default()))
        .extract(&path)
        .unwrap();

    assert_eq!(records.len(), 1);
    assert!(records[0].signer_ekus().contains(&WHQL_EKU.to_string()));
    assert_eq!(records[0].message().program_names(), vec!["Contoso OEM"]);
}

#[test]
fn nested_signatures_are_extracted_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let primary = TestSigner::contoso();
    let second = TestSigner::with_leaf("CN=Fabrikam Tools,O=Fabrikam", 7, false);
    let path = write_file(
        dir.path(),
        "dual.dll",
        &sign_pe(build_pe(512, 2), &primary, &[&second]),
    );

    let verifier = Arc::new(CountingVerifier::default());
    let records = extractor(Arc::clone(&verifier)).extract(&path).unwrap();

    let leaves: Vec<&str> = records
        .iter()
        .map(|record| record.chain().leaf().unwrap().subject_cn())
        .collect();
    assert_eq!(leaves, vec!["Contoso Apps", "Fabrikam Tools"]);
    assert_eq!(verifier.opened(), 2);
    assert_eq!(verifier.closed(), 2);
}

#[test]
fn expired_signers_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let expired = TestSigner::with_leaf("CN=Old Publisher", 9, true);
    let valid = TestSigner::contoso();
    let path = write_file(
        dir.path(),
        "legacy.exe",
        &sign_pe(build_pe(256, 3), &expired, &[&valid]),
    );

    let verifier = Arc::new(CountingVerifier::default());
    let records = extractor(Arc::clone(&verifier)).extract(&path).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chain().leaf().unwrap().subject_cn(), "Contoso Apps");
    assert_eq!(verifier.opened(), verifier.closed());
}

#[test]
fn tampered_image_is_a_hash_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut signed = sign_pe(build_pe(512, 4), &TestSigner::contoso(), &[]);
    signed[HEADERS_LEN + 100] ^= 0xff;
    let path = write_file(dir.path(), "tampered.exe", &signed);

    let verifier = Arc::new(CountingVerifier::default());
    let result = extractor(Arc::clone(&verifier)).extract(&path);

    assert!(matches!(result, Err(SimulationError::HashMismatch { .. })));
    assert_eq!(verifier.opened(), 1);
    assert_eq!(verifier.closed(), 1);
}

#[test]
fn unsigned_image_has_no_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "plain.exe", &build_pe(256, 5));

    let verifier = Arc::new(CountingVerifier::default());
    let records = extractor(Arc::clone(&verifier)).extract(&path).unwrap();
    assert!(records.is_empty());
    assert_eq!(verifier.opened(), 1);
    assert_eq!(verifier.closed(), 1);
}

#[test]
fn verification_time_controls_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let expired = TestSigner::with_leaf("CN=Old Publisher", 9, true);
    let path = write_file(dir.path(), "old.exe", &sign_pe(build_pe(128, 6), &expired, &[]));

    let then = chrono::DateTime::parse_from_rfc3339("2020-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let state = PortableTrustVerifier::new()
        .with_verification_time(then)
        .open(&path, 0)
        .unwrap();
    assert_eq!(state.status, TrustStatus::Success);
    assert_eq!(state.secondary_signers, Some(0));

    let state = PortableTrustVerifier::new().open(&path, 0).unwrap();
    assert_eq!(state.status, TrustStatus::CertExpired);
}

#[test]
fn catalog_files_are_read_whole() {
    let dir = tempfile::tempdir().unwrap();
    let signer = TestSigner::contoso();
    let path = write_file(
        dir.path(),
        "vendor.cat",
        &catalog(&[vec![0x11; 20]], &signer),
    );

    let records = SignerExtractor::new(Arc::new(PortableTrustVerifier::new()))
        .extract(&path)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].chain().elements()[0].tbs_hash(),
        signer.leaf_tbs()
    );
}
