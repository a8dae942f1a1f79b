//! Integration tests for cmake-matrix
//!
//! Only paths that fail or exit before the container engine is needed.

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn cmake_matrix() -> Command {
        let mut cmd = cargo_bin_cmd!("cmake-matrix");
        cmd.env_remove("CMAKE_MATRIX_RUNTIME")
            .env_remove("CMAKE_MATRIX_SETTINGS");
        cmd
    }

    #[test]
    fn help_displays() {
        cmake_matrix()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("CMake build configurations"))
            .stdout(predicate::str::contains("--keep-build"));
    }

    #[test]
    fn version_displays() {
        cmake_matrix()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cmake-matrix"));
    }

    #[test]
    fn matrix_argument_required() {
        cmake_matrix()
            .assert()
            .failure()
            .stderr(predicate::str::contains("<MATRIX>"));
    }

    #[test]
    fn missing_matrix_file() {
        let temp = TempDir::new().unwrap();
        cmake_matrix()
            .current_dir(temp.path())
            .args(["missing.yaml", "--settings", "/dev/null"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Build matrix file not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_matrix_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bad.yaml"), "configs: [ {name: a, config: -DX=1\n").unwrap();

        cmake_matrix()
            .current_dir(temp.path())
            .args(["bad.yaml", "--settings", "/dev/null"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid build matrix"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("dup.yaml"),
            "configs:\n  - name: a\n    config: -DX=1\n  - name: a\n    config: -DX=2\n",
        )
        .unwrap();

        cmake_matrix()
            .current_dir(temp.path())
            .args(["dup.yaml", "--settings", "/dev/null"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid build matrix"));
    }

    #[test]
    fn invalid_settings_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("settings.toml"), "[commands]\njobs = \"many\"\n").unwrap();
        std::fs::write(temp.path().join("m.yaml"), "configs:\n  - name: a\n    config: \"\"\n").unwrap();

        cmake_matrix()
            .current_dir(temp.path())
            .args(["m.yaml", "--settings", "settings.toml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid settings"));
    }

    #[test]
    fn keep_and_discard_conflict() {
        cmake_matrix()
            .args(["m.yaml", "--keep-build", "--discard-build"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot be used with"));
    }

    #[test]
    fn unknown_runtime_rejected() {
        cmake_matrix()
            .args(["m.yaml", "--runtime", "lxc"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}
