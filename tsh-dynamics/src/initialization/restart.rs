use crate::defaults;
use crate::error::{DynamicsError, Result};
use crate::initialization::DynamicsVariables;
use std::fs;
use std::path::Path;

/// Load the state of the ensemble from the restart file in `directory`
pub fn read_restart(directory: &Path) -> Result<DynamicsVariables> {
    let restart_file_path = directory.join(defaults::RESTART_FILE_NAME);
    let restart_string: String = fs::read_to_string(&restart_file_path)?;
    serde_yaml::from_str(&restart_string).map_err(|err| DynamicsError::Parse {
        what: "restart file",
        message: err.to_string(),
    })
}

/// Write the state of the ensemble into the restart file in `directory`
pub fn write_restart(directory: &Path, variables: &DynamicsVariables) -> Result<()> {
    let restart_string: String =
        serde_yaml::to_string(variables).map_err(|err| DynamicsError::Parse {
            what: "restart file",
            message: err.to_string(),
        })?;
    fs::write(directory.join(defaults::RESTART_FILE_NAME), restart_string)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::DynamicConfiguration;
    use crate::interface::test_models::LinearCrossing;

    #[test]
    fn restart_file_round_trip() {
        let config = DynamicConfiguration::from_toml(
            "ntraj = 3\n[electronic_init]\nsampling = \"random_phase\"\n\
             [nuclear]\npositions = [-5.0]\nmomenta = [10.0]\nmasses = [2000.0]",
        )
        .unwrap();
        let variables = DynamicsVariables::new(&config, &LinearCrossing::default()).unwrap();
        let directory = tempfile::tempdir().unwrap();
        write_restart(directory.path(), &variables).unwrap();
        let restored = read_restart(directory.path()).unwrap();
        assert_eq!(restored, variables);
    }

    #[test]
    fn missing_restart_file_is_an_io_error() {
        let directory = tempfile::tempdir().unwrap();
        assert!(matches!(read_restart(directory.path()), Err(DynamicsError::Io(_))));
    }
}
