pub mod analyzer;
pub mod architecture;
pub mod bug;
pub mod generator;
pub mod impact;
pub mod index;
pub mod keywords;
pub mod orchestrator;
pub mod prompts;
pub mod quality;
pub mod ranker;
pub mod scan;
pub mod testgen;
