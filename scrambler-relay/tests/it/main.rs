mod control;
mod relay;
