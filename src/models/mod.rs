pub mod assignment;
pub mod attempt;
pub mod evaluation;
pub mod game;
pub mod official;
