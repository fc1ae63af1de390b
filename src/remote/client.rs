//! Blocking JSON-over-TCP transport for the build-orchestration server.
//!
//! Requests and responses are single JSON lines. A patch upload is the one
//! exception: after the request line the raw patch bytes follow, exactly
//! `size` of them, and the response line comes after the stream.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::remote::api::{
    BuildConfiguration, BuildRequest, ChangeListId, ConfigurationId, PatchMetadata,
    ScheduleOutcome, ServerFacade, SummaryEntry, TransportError,
};

/// Client side of one request.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Authenticate {
        user: &'a str,
        password: &'a str,
    },
    ListConfigurations,
    ApplicableConfigurations {
        touched_paths: &'a BTreeSet<String>,
    },
    UploadPatch {
        metadata: &'a PatchMetadata,
        size: u64,
    },
    ScheduleBuilds {
        batch: &'a [BuildRequest],
    },
    FetchSummary {
        user: &'a str,
    },
}

/// Server side of one response. `payload` is shaped per operation.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn round_trip(&mut self, request: &Request<'_>) -> Result<Envelope, TransportError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.read_envelope()
    }

    fn read_envelope(&mut self) -> Result<Envelope, TransportError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        Ok(serde_json::from_str(&line)?)
    }
}

/// One authenticated connection. Calls are serialized behind a mutex; the
/// protocol has no pipelining.
#[derive(Debug)]
pub struct RpcClient {
    address: String,
    connection: Mutex<Connection>,
}

impl RpcClient {
    /// Connects and authenticates in one step. An authentication rejection
    /// is reported as [`TransportError::Auth`], not a generic server error.
    pub fn connect(address: &str, user: &str, password: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address).map_err(|source| TransportError::Connect {
            address: address.to_owned(),
            source,
        })?;
        let reader = BufReader::new(stream.try_clone()?);
        let mut connection = Connection {
            reader,
            writer: stream,
        };

        let envelope = connection.round_trip(&Request::Authenticate { user, password })?;
        if !envelope.ok {
            return Err(TransportError::Auth {
                user: user.to_owned(),
                reason: envelope
                    .error
                    .unwrap_or_else(|| "credentials rejected".to_owned()),
            });
        }
        debug!(address, user, "authenticated");

        Ok(Self {
            address: address.to_owned(),
            connection: Mutex::new(connection),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn call<T: DeserializeOwned>(&self, request: &Request<'_>) -> Result<T, TransportError> {
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let envelope = connection.round_trip(request)?;
        Self::unwrap_payload(envelope)
    }

    fn unwrap_payload<T: DeserializeOwned>(envelope: Envelope) -> Result<T, TransportError> {
        if !envelope.ok {
            return Err(TransportError::Server(
                envelope.error.unwrap_or_else(|| "unspecified".to_owned()),
            ));
        }
        Ok(serde_json::from_value(envelope.payload)?)
    }
}

impl ServerFacade for RpcClient {
    fn list_configurations(&self) -> Result<Vec<BuildConfiguration>, TransportError> {
        self.call(&Request::ListConfigurations)
    }

    fn applicable_configurations(
        &self,
        touched_paths: &BTreeSet<String>,
    ) -> Result<BTreeSet<ConfigurationId>, TransportError> {
        self.call(&Request::ApplicableConfigurations { touched_paths })
    }

    fn upload_patch(
        &self,
        patch: &Path,
        metadata: &PatchMetadata,
    ) -> Result<ChangeListId, TransportError> {
        let mut file = File::open(patch)?;
        let size = file.metadata()?.len();

        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut line = serde_json::to_string(&Request::UploadPatch { metadata, size })?;
        line.push('\n');
        connection.writer.write_all(line.as_bytes())?;

        let copied = io::copy(&mut file, &mut connection.writer)?;
        if copied != size {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("patch shrank during upload: {copied} of {size} bytes"),
            )));
        }
        connection.writer.flush()?;
        debug!(bytes = size, "patch uploaded");

        Self::unwrap_payload(connection.read_envelope()?)
    }

    fn schedule_builds(&self, batch: &[BuildRequest]) -> Result<ScheduleOutcome, TransportError> {
        self.call(&Request::ScheduleBuilds { batch })
    }

    fn fetch_summary(&self, user: &str) -> Result<Vec<SummaryEntry>, TransportError> {
        self.call(&Request::FetchSummary { user })
    }
}
