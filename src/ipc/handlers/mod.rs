pub mod attendance;
pub mod classes;
pub mod core;
pub mod exams;
pub mod grading;
pub mod notices;
pub mod payments;
pub mod reports;
pub mod schools;
pub mod sessions;
pub mod settings;
pub mod students;
pub mod subjects;
pub mod teachers;
pub mod terms;
pub mod users;
