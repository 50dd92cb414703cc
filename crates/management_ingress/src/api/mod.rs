pub mod certmanager;
pub mod route;
pub mod v1alpha1;
