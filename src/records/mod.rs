//! Structured records created by rule actions.

pub mod model;

pub use model::{
    Event, ExecutionResult, Invoice, InvoiceStatus, Order, OrderStatus, Package, PackageStatus,
    ProcessedMessageRecord, RecordKind, RecordRef, Task, TaskPriority,
};
