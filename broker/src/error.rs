use sysbroker_ipc::IpcError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    ClientCommunicationError(IpcError),
    InternalOsOperationFailed { description: String, os_code: i32 },
}

impl From<IpcError> for BrokerError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::InternalOsOperationFailed {
                description,
                os_code,
            } => Self::InternalOsOperationFailed {
                description: description.to_owned(),
                os_code,
            },
            other => Self::ClientCommunicationError(other),
        }
    }
}
