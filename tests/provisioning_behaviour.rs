//! Behavioural scenarios for the provisioning request pipeline.

mod provisioning;
