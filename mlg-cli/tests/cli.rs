use assert_cmd::Command;
use mlg::test::GameFixture;
use predicates::prelude::*;

fn mlg(fixture: &GameFixture) -> Command {
    let mut cmd = Command::cargo_bin("mlg").unwrap();
    cmd.arg("--loader-dir").arg(&fixture.installer_dir);
    cmd
}

#[test]
fn install_and_uninstall() {
    let fixture = GameFixture::new("Game");
    let before = fixture.snapshot();

    mlg(&fixture)
        .arg("install")
        .arg(&fixture.exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed MLG into Game"))
        .stdout(predicate::str::contains("Game.Patched"));
    assert!(fixture.backup().is_file());
    assert!(fixture.patched().is_file());
    assert!(fixture.install_root().join("core").join("MLG.Core.dll").is_file());

    mlg(&fixture)
        .arg("install")
        .arg(&fixture.exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("already installed"));

    mlg(&fixture)
        .arg("uninstall")
        .arg(&fixture.exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("Uninstalled MLG from Game"));
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn uninstall_without_install() {
    let fixture = GameFixture::new("Game");
    let before = fixture.snapshot();

    mlg(&fixture)
        .arg("uninstall")
        .arg(&fixture.exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("not installed"));
    assert_eq!(fixture.snapshot(), before);
}

#[test]
fn clean_repairs_partial_install() {
    let fixture = GameFixture::new("Game");
    let original = std::fs::read(fixture.module()).unwrap();
    std::fs::copy(fixture.module(), fixture.backup()).unwrap();
    std::fs::write(fixture.module(), b"half-written shim").unwrap();

    mlg(&fixture)
        .arg("clean")
        .arg(&fixture.exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored the original game module"));
    assert_eq!(std::fs::read(fixture.module()).unwrap(), original);
    assert!(!fixture.backup().exists());
}

#[test]
fn json_output() {
    let fixture = GameFixture::new("Game");

    let output = mlg(&fixture)
        .arg("--json")
        .arg("install")
        .arg(&fixture.exe)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["game"], "Game");
    assert_eq!(summary["installed"], true);
    assert_eq!(summary["details"]["patched_name"], "Game.Patched");
    assert_eq!(summary["details"]["return_sites"], 2);
}

#[test]
fn errors_are_reported_not_fatal() {
    let fixture = GameFixture::new("Game");

    mlg(&fixture)
        .arg("install")
        .arg(fixture.root.path().join("Missing.exe"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Error:"))
        .stdout(predicate::str::contains("Missing"));
}

#[test]
fn missing_loader_module() {
    let fixture = GameFixture::new("Game");
    std::fs::remove_file(fixture.installer_dir.join("GodotPlugins.dll")).unwrap();

    mlg(&fixture)
        .arg("install")
        .arg(&fixture.exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("GodotPlugins.dll"));
    assert!(!fixture.backup().exists());
}

#[test]
fn usage_without_arguments() {
    Command::cargo_bin("mlg")
        .unwrap()
        .assert()
        .success()
        .stderr(predicate::str::contains("Usage"));

    Command::cargo_bin("mlg")
        .unwrap()
        .arg("install")
        .assert()
        .success()
        .stderr(predicate::str::contains("<GAME>"));
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("mlg")
        .unwrap()
        .arg("help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("uninstall"))
        .stdout(predicate::str::contains("clean"));
}
