// Git gateway: staging, diffing, committing, pushing one working tree.

pub mod worker;
