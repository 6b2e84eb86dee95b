//! Durable storage of the run watermark.
//!
//! The checkpoint is a plain text file holding one integer, at
//! `<output root>/last_post.num`. It is read once when a run starts and
//! written once when a run that processed at least one post ends. A run that
//! aborts leaves it untouched, so the next run re-captures whatever the failed
//! run had done.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use harvest_logging::{harvest_info, harvest_warn};
use harvester_core::{Checkpoint, CheckpointParseError, CHECKPOINT_FILENAME};
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint file {} does not exist and this is not a first run", .0.display())]
    Missing(PathBuf),
    #[error("checkpoint file {}: {source}", path.display())]
    Unparsable {
        path: PathBuf,
        #[source]
        source: CheckpointParseError,
    },
    #[error("reading checkpoint file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to move the checkpoint back from {current} to {requested}")]
    Regression {
        current: Checkpoint,
        requested: Checkpoint,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl CheckpointError {
    /// The checkpoint file is absent or unreadable as a watermark; nothing a retry would fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CheckpointError::Missing(_) | CheckpointError::Unparsable { .. }
        )
    }
}

/// What a missing checkpoint file means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingCheckpoint {
    /// The file must exist; its absence is a configuration error.
    #[default]
    Fail,
    /// Documented first run: start from checkpoint 0.
    StartFromZero,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    writer: AtomicFileWriter,
    path: PathBuf,
    on_missing: MissingCheckpoint,
}

impl CheckpointStore {
    pub fn new(output_root: &Path, on_missing: MissingCheckpoint) -> Self {
        Self {
            writer: AtomicFileWriter::new(output_root.to_path_buf()),
            path: output_root.join(CHECKPOINT_FILENAME),
            on_missing,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        match self.read_existing()? {
            Some(checkpoint) => {
                harvest_info!("loaded checkpoint {checkpoint} from {}", self.path.display());
                Ok(checkpoint)
            }
            None => match self.on_missing {
                MissingCheckpoint::StartFromZero => {
                    harvest_warn!(
                        "no checkpoint at {}, first run starts from 0",
                        self.path.display()
                    );
                    Ok(Checkpoint::ZERO)
                }
                MissingCheckpoint::Fail => Err(CheckpointError::Missing(self.path.clone())),
            },
        }
    }

    /// Overwrites the stored watermark. A lower value than the stored one is rejected.
    pub fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if let Some(current) = self.read_existing()? {
            if checkpoint < current {
                return Err(CheckpointError::Regression {
                    current,
                    requested: checkpoint,
                });
            }
        }
        self.writer
            .write(CHECKPOINT_FILENAME, &checkpoint.to_string())?;
        harvest_info!("checkpoint {checkpoint} written to {}", self.path.display());
        Ok(())
    }

    fn read_existing(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        content
            .parse::<Checkpoint>()
            .map(Some)
            .map_err(|source| CheckpointError::Unparsable {
                path: self.path.clone(),
                source,
            })
    }
}
