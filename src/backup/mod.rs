pub mod artifact;
pub mod backup_config;
pub mod env_store;
pub mod pipeline;
pub mod redacted;
pub mod result_error;
pub mod runner;
pub mod upload;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
