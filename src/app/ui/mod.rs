mod controls;
mod details;
mod panels;
mod signals;
