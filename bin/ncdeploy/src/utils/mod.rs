pub mod process;
pub mod volume;
pub mod image;
pub mod container;
pub mod nginx;
pub mod cert;
