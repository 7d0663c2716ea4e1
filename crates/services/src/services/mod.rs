pub mod dashboard;
pub mod gemini_api;
pub mod inventory;
pub mod visit_store;
pub mod visit_workflow;
pub mod water_chemistry;
