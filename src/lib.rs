pub mod benders;
pub mod formulation;
pub mod instance;
pub mod milp;
pub mod overlap;
pub mod render;
pub mod solver;
pub mod types;
