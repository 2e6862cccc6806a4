pub mod errors;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod plan;
pub mod prompt_template;
pub mod providers;
pub mod researcher;
pub mod toolkit;
pub mod wikipedia;
