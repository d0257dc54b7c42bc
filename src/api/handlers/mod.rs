pub(crate) mod downloads;
pub(crate) mod install;
pub(crate) mod packages;
pub(crate) mod settings;
