pub mod calendar;
pub mod planner;
