//! The software model: processes and instructions, containers and volumes,
//! packets, microservices, api calls and users.

pub(crate) mod apicall;
pub(crate) mod container;
pub(crate) mod microservice;
pub(crate) mod packet;
pub(crate) mod process;
pub(crate) mod user;
