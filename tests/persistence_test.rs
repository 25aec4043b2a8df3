#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // First run: register tenants, record readings and bill October.
    let output1 = Command::new(cargo_bin!("rentbill"))
        .args(["--directory", "tests/fixtures/directory.csv"])
        .arg("--db-path")
        .arg(&db_path)
        .args(["bill", "--period", "2024-10", "--issued-on", "2024-10-01"])
        .args(["--readings", "tests/fixtures/readings.csv"])
        .output()
        .expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("INV-1-202410,1,2024-10,12000,600,0,12600,"));

    // Second run against the same database, with no directory: November
    // carries October's unpaid balance forward.
    let output2 = Command::new(cargo_bin!("rentbill"))
        .arg("--db-path")
        .arg(&db_path)
        .args(["bill", "--period", "2024-11", "--issued-on", "2024-11-01"])
        .output()
        .expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains("INV-1-202411,1,2024-11,12000,0,12600,24600,"));

    // The ledger holds both invoices and no payments.
    let output3 = Command::new(cargo_bin!("rentbill"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("ledger")
        .output()
        .expect("Failed to execute command");
    let stdout3 = String::from_utf8_lossy(&output3.stdout);
    assert!(stdout3.contains("1,Wanjiku,10,0,12600,24600,24600,0,24600,unpaid"));
}
