mod check;
mod run;
mod serve;

pub use check::run_check;
pub use run::{RunArgs, run_once};
pub use serve::{ServeArgs, run_serve};
