pub mod config;
pub mod consumer;
pub mod db;
pub mod lang;
pub mod model;
pub mod service;
pub mod storage;
pub mod textutil;
pub mod translate;
