//! Material requests domain module (event-sourced).
//!
//! Goods-issue requests against project budget lines, plus the budget items
//! they impute to. Stock sufficiency and efficiency advisories are checked
//! by the request service against the materials read model; this crate holds
//! the request shape rules and the REQUESTED -> DISPATCHED lifecycle.

pub mod budget;
pub mod request;

pub use budget::{
    BudgetItem, BudgetItemCommand, BudgetItemEvent, BudgetItemId, BudgetItemRegistered, ProjectId,
    RegisterBudgetItem,
};
pub use request::{
    DispatchRequest, FileRequest, MaterialRequest, RequestCommand, RequestDispatched, RequestEvent,
    RequestFiled, RequestId, RequestLine, RequestStatus, RequestType,
};
