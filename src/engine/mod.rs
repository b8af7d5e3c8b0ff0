pub mod assignment;
pub mod eligibility;
pub mod evaluation;
pub mod parser;
pub mod prompt;
pub mod theoretical_max;
