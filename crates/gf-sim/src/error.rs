use gf_controls::ControlError;
use gf_cosim::CosimError;
use gf_project::ProjectError;
use gf_results::ResultsError;
use gf_solver::SolverError;

pub type SimResult<T> = Result<T, SimError>;

#[derive(thiserror::Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Results(#[from] ResultsError),

    #[error(transparent)]
    Cosim(#[from] CosimError),

    #[error("Setup error: {what}")]
    Setup { what: String },
}
