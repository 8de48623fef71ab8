pub mod part_tree;
