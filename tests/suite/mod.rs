mod board;
mod config;
mod form_session;
mod national_id;
