pub mod alerts;
pub mod dashboard;
pub mod experience;
pub mod lessons;
pub mod llm_provider;
pub mod tutor;
