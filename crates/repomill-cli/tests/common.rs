use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

const FAKE_RSYNC: &str = r#"#!/bin/sh
case "$1" in
-l)
    ln -s "20250502-0001" "${3}latest"
    exit 0
    ;;
esac
case "$@" in
*--list-only*htcondor*)
    echo "-rw-r--r-- 1,000 2025/05/02 10:00:00 condor-24.0.5-1.el9.x86_64.rpm"
    exit 0
    ;;
*--list-only*)
    echo "drwxr-xr-x 4,096 2025/05/02 10:00:00 ."
    exit 0
    ;;
esac
for last; do :; done
case "$last" in
*.rpm)
    touch "$last"
    exit 0
    ;;
esac
mkdir -p "$last/x86_64/Packages" "$last/aarch64/Packages" "$last/src/Packages"
touch "$last/x86_64/Packages/osg-release-24.0-1.el9.noarch.rpm"
touch "$last/x86_64/Packages/foo-1.0-1.el9.x86_64.rpm"
touch "$last/aarch64/Packages/foo-1.0-1.el9.aarch64.rpm"
touch "$last/src/Packages/foo-1.0-1.el9.src.rpm"
exit 0
"#;

const FAKE_INDEX_BUILDER: &str = "#!/bin/sh\nmkdir -p \"$1/repodata\"\ntouch \"$1/repodata/repomd.xml\"\nexit 0\n";

/// A scratch install: fake tools, a config file pointing everything into
/// the temp dir, and a catalog that answers with a fixed tag list.
pub struct TestEnv {
    pub root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_catalog(
            r#"["/bin/sh", "-c", "printf 'devops-el9-itb\nosg-24-main-el9-release\n'"]"#,
        )
    }

    pub fn with_catalog(catalog_command: &str) -> Self {
        let root = TempDir::new().unwrap();
        let env = TestEnv { root };
        env.write_script("fake-rsync", FAKE_RSYNC);
        env.write_script("fake-createrepo", FAKE_INDEX_BUILDER);
        let config = format!(
            r#"
[paths]
dest_root = "{base}/repo"
state_dir = "{base}/state"
lock_dir = "{base}/locks"
log_dir = "{base}/logs"
repo_config_dir = "{base}/repomill.d"

[catalog]
command = {catalog_command}
patterns = ["devops-el*-*", "osg-2?-*-el*-*"]

[tools]
rsync = "{base}/fake-rsync"
index_builder = "{base}/fake-createrepo"
build_rsync = "rsync://build/repos-dist"
condor_rsync = "rsync://external/htcondor"

[limits]
workers = 2
lock_timeout_secs = 5
transfer_retries = 0
retry_delay_ms = 1
"#,
            base = env.root.path().display()
        );
        fs::write(env.config_path(), config).unwrap();
        env
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.path().join("repomill.toml")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    fn write_script(&self, name: &str, body: &str) {
        let path = self.root.path().join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("repomill").unwrap();
        cmd.arg("--config").arg(self.config_path());
        cmd
    }
}
