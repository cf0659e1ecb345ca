//! Operation matching and transactional execution.
//!
//! An operation definition describes an expected scan sequence plus execution
//! policy (auto-execute, confirmation, which audit logs to emit). The
//! executor turns a matched definition into one atomic unit of domain-state
//! mutations and log records, recorded on an auditable
//! [`OperationExecution`] row. The execution row is the single record that
//! survives a rolled-back unit.

pub mod definition;
pub mod domain;
pub mod error;
pub mod execution;
pub mod executor;
pub mod handlers;

pub use definition::{OperationCatalog, OperationDefinition, OperationStep};
pub use domain::{
    AccessoryRecord, BedRecord, DepartmentRecord, DeviceRecord, DeviceStatus, DomainState,
    DomainStore, HandoverLog, InMemoryDomain, LogKind, LogRef, PatientRecord,
    PatientTransferLog, Stamp, TransferLog, UnitOutcome, UnitWork, UsageLog,
};
pub use error::{OpsError, OpsResult};
pub use execution::{
    ExecutionStatus, ExecutionStore, InMemoryExecutionStore, OperationExecution,
};
pub use executor::{ExecutionReceipt, OperationExecutor};
pub use handlers::{Handler, HandlerRegistry, HandlerReport};
