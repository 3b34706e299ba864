pub mod appointment;
pub mod approval;
pub mod contract;
pub mod customer;
pub mod financing;
pub mod product;
pub mod proposal;
pub mod service;
pub mod user;
