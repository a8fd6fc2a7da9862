mod fire;
mod invalid_json;
mod postgres;
