mod array;
mod env;

pub use array::{batches, remainder_batch_len};
pub use env::{load_env_for_config, substitute_env_variables, SubstituteEnvError};
