use molsim_core::error::MolsimError;
use molsim_core::{Connection, Connector};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Opens one multiplexed ssh master connection per node.
pub struct SshConnector {
    user: String,
    key: PathBuf,
    control_dir: PathBuf,
}

pub struct SshConnection {
    host: String,
    user: String,
    key: PathBuf,
    control_path: PathBuf,
    closed: bool,
}

impl SshConnector {
    pub fn new(user: &str, key: &Path) -> SshConnector {
        SshConnector {
            user: user.to_string(),
            key: key.to_path_buf(),
            control_dir: std::env::temp_dir().join("molsim-ssh"),
        }
    }

    fn master_command(&self, host: &str, control_path: &Path) -> Command {
        let mut cmd = ssh_command(&self.key, control_path);
        cmd.args(["-f", "-N"])
            .args(["-o", "ControlMaster=yes", "-o", "ControlPersist=yes"])
            .arg(format!("{}@{}", self.user, host));
        cmd
    }
}

fn ssh_command(key: &Path, control_path: &Path) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-i")
        .arg(key)
        .args(["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"])
        .arg("-o")
        .arg(format!("ControlPath={}", control_path.display()));
    cmd
}

fn failure(host: &str, what: &str, output: &std::process::Output) -> MolsimError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    MolsimError::remote(
        host,
        format!("{} exited with {:?}: {}", what, output.status.code(), stderr.trim()),
    )
}

impl Connector for SshConnector {
    fn connect(&self, host: &str) -> Result<Box<dyn Connection>, MolsimError> {
        fs::create_dir_all(&self.control_dir)?;
        // %C hashes host, port and user so the socket path stays short.
        let control_path = self.control_dir.join("%C");

        let output = self
            .master_command(host, &control_path)
            .output()
            .map_err(|e| MolsimError::remote(host, format!("failed to execute ssh: {}", e)))?;
        if !output.status.success() {
            return Err(failure(host, "ssh", &output));
        }

        Ok(Box::new(SshConnection {
            host: host.to_string(),
            user: self.user.clone(),
            key: self.key.clone(),
            control_path,
            closed: false,
        }))
    }
}

impl SshConnection {
    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn exec_command(&self, command: &str) -> Command {
        let mut cmd = ssh_command(&self.key, &self.control_path);
        cmd.arg(self.target()).arg("--").arg(command);
        cmd
    }

    fn exit_command(&self) -> Command {
        let mut cmd = ssh_command(&self.key, &self.control_path);
        cmd.args(["-O", "exit"]).arg(self.target());
        cmd
    }
}

impl Connection for SshConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn execute(&self, command: &str) -> Result<Vec<String>, MolsimError> {
        debug!(host = %self.host, command, "running remote command");
        let output = self
            .exec_command(command)
            .output()
            .map_err(|e| MolsimError::remote(&self.host, format!("failed to execute ssh: {}", e)))?;
        if !output.status.success() {
            return Err(failure(&self.host, command, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn close(&mut self) -> Result<(), MolsimError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let output = self
            .exit_command()
            .output()
            .map_err(|e| MolsimError::remote(&self.host, format!("failed to execute ssh: {}", e)))?;
        if !output.status.success() {
            return Err(failure(&self.host, "ssh -O exit", &output));
        }
        Ok(())
    }
}

impl Drop for SshConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(host = %self.host, error = %e, "failed to close control connection");
        }
    }
}

fn interactive_command(user: &str, key: &Path, host: &str) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-i").arg(key).arg(format!("{}@{}", user, host));
    cmd
}

/// Open an interactive shell on `host` and wait for it to exit.
pub fn interactive(user: &str, key: &Path, host: &str) -> Result<(), MolsimError> {
    let status = interactive_command(user, key, host)
        .status()
        .map_err(|e| MolsimError::from(format!("Failed to execute ssh: {}", e)))?;

    if !status.success() {
        return Err(format!("ssh exited with code: {:?}", status.code()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn connection() -> SshConnection {
        SshConnection {
            host: "ec2-1.compute-1.amazonaws.com".into(),
            user: "root".into(),
            key: PathBuf::from("/keys/molsim.pem"),
            control_path: PathBuf::from("/tmp/molsim-ssh/%C"),
            // keep Drop from shelling out
            closed: true,
        }
    }

    #[test]
    fn master_command_backgrounds_a_persistent_master() {
        let connector = SshConnector::new("root", Path::new("/keys/molsim.pem"));
        let cmd = connector.master_command("host-a", Path::new("/tmp/ctl/%C"));
        assert_eq!(cmd.get_program(), "ssh");
        let args = args(&cmd);
        assert_eq!(&args[..2], ["-i", "/keys/molsim.pem"]);
        assert!(args.contains(&"ControlPath=/tmp/ctl/%C".to_string()));
        assert!(args.contains(&"ControlMaster=yes".to_string()));
        assert!(args.contains(&"-N".to_string()));
        assert_eq!(args.last().unwrap(), "root@host-a");
    }

    #[test]
    fn exec_command_reuses_control_socket() {
        let conn = connection();
        let args = args(&conn.exec_command("getent hosts ip-10-0-0-1.ec2.internal"));
        assert!(args.contains(&"ControlPath=/tmp/molsim-ssh/%C".to_string()));
        let tail = &args[args.len() - 3..];
        assert_eq!(
            tail,
            [
                "root@ec2-1.compute-1.amazonaws.com",
                "--",
                "getent hosts ip-10-0-0-1.ec2.internal"
            ]
        );
    }

    #[test]
    fn exit_command_stops_the_master() {
        let conn = connection();
        let args = args(&conn.exit_command());
        let tail = &args[args.len() - 3..];
        assert_eq!(tail, ["-O", "exit", "root@ec2-1.compute-1.amazonaws.com"]);
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let mut conn = connection();
        assert!(conn.close().is_ok());
        assert!(conn.close().is_ok());
    }

    #[test]
    fn interactive_command_targets_user_at_host() {
        let cmd = interactive_command("root", Path::new("/keys/k.pem"), "master.example.com");
        assert_eq!(args(&cmd), ["-i", "/keys/k.pem", "root@master.example.com"]);
    }
}
