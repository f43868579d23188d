use crate::{
    AddressSpace, AlignmentMode, BinaryFormat, Block, BoneInfo, ClothBlock, ConstraintBlock,
    EX_BONE_ID_FLAG, Error, ExpressionBlock, Matrix4, MotionBlock, NodeData, OsageBlock,
    OsageBone, Skin, StringSet, Writer,
};
use byteorder::{ByteOrder, LittleEndian};

fn mat(seed: f32) -> Matrix4 {
    let mut m = [[0.0f32; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = seed + (i * 4 + j) as f32 * 0.25;
        }
    }
    m
}

fn sample_skin() -> Skin {
    let mut hara = BoneInfo::new(0, "n_hara");
    hara.inverse_bind_pose_matrix = mat(1.0);
    let mut ude = BoneInfo::new(1, "kl_ude_l");
    ude.inverse_bind_pose_matrix = mat(2.0);
    ude.parent = Some(0);
    let mut osage_root = BoneInfo::new(EX_BONE_ID_FLAG, "kl_osage_root");
    osage_root.inverse_bind_pose_matrix = mat(3.0);
    osage_root.parent = Some(1);

    let osage = OsageBlock {
        node: NodeData {
            parent_name: Some("kl_ude_l".to_string()),
            position: [0.1, 0.2, 0.3],
            rotation: [0.0, 0.5, 0.0],
            scale: [1.0, 1.0, 1.0],
        },
        name: "osg_hair".to_string(),
        external_name: Some("hair".to_string()),
        bones: vec![
            OsageBone {
                name: "j_hair_00".to_string(),
                sibling_name: Some("j_hair_01".to_string()),
                sibling_distance: 0.05,
            },
            OsageBone::new("j_hair_01"),
        ],
        ..OsageBlock::default()
    };
    let expression = ExpressionBlock {
        node: NodeData::default(),
        bone_name: "kl_eye_l".to_string(),
        expressions: vec!["v_def(eye, 1)".to_string(), "v_def(eye, 0)".to_string()],
    };
    let motion = MotionBlock {
        name: "mot_swing".to_string(),
        bone_names: vec!["n_hara".to_string(), "kl_ude_l".to_string()],
        bone_matrices: vec![mat(4.0), mat(5.0)],
    };
    let constraint = ConstraintBlock {
        node: NodeData::default(),
        coupling: 1,
        source_bone_name: "n_hara".to_string(),
    };
    let cloth = ClothBlock {
        name: "cls_skirt".to_string(),
        force: 0.5,
        force_gain: 0.1,
    };

    Skin {
        bones: vec![hara, ude, osage_root],
        blocks: vec![
            Block::Osage(osage),
            Block::Expression(expression),
            Block::Motion(motion),
            Block::Constraint(constraint),
            Block::Cloth(cloth),
        ],
    }
}

fn pointer_at(bytes: &[u8], at: usize) -> u32 {
    LittleEndian::read_u32(&bytes[at..at + 4])
}

// 32-bit header field offsets.
const HEADER_BONE_IDS: usize = 0;
const HEADER_EX_DATA: usize = 12;
const HEADER_BONE_COUNT: usize = 16;
const HEADER_PARENT_IDS: usize = 20;
const HEADER_RESERVED: usize = 24;

#[test]
fn structural_round_trip() {
    let skin = sample_skin();
    let bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();
    let parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();
    assert_eq!(parsed, skin);
}

#[test]
fn reserialization_is_byte_stable() {
    let skin = sample_skin();
    let first = skin.to_bytes(BinaryFormat::Ft).unwrap();
    let reread = Skin::from_bytes(&first, BinaryFormat::Ft).unwrap();
    let second = reread.to_bytes(BinaryFormat::Ft).unwrap();
    assert_eq!(first, second);

    let first_x = skin.to_bytes(BinaryFormat::X).unwrap();
    let reread_x = Skin::from_bytes(&first_x, BinaryFormat::X).unwrap();
    assert_eq!(first_x, reread_x.to_bytes(BinaryFormat::X).unwrap());
}

#[test]
fn empty_block_list_serializes_as_absent_region() {
    let skin = Skin {
        bones: vec![BoneInfo::new(0, "n_hara")],
        blocks: Vec::new(),
    };
    let bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();
    assert_eq!(pointer_at(&bytes, HEADER_EX_DATA), 0);
    let parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();
    assert!(parsed.blocks.is_empty());
    assert_eq!(parsed.bones.len(), 1);
}

#[test]
fn unknown_block_signature_is_skipped_without_corruption() {
    let mut set = StringSet::new();
    set.get_or_add("cls_a");
    set.get_or_add("cls_b");

    let mut w = Writer::new(AddressSpace::Bits32);
    w.write_pointer(0).unwrap();
    w.write_pointer(0).unwrap();
    w.write_pointer(0).unwrap();
    w.schedule(4, AlignmentMode::Center, |w, s| {
        w.write_i32(0);
        w.write_i32(0);
        w.write_u32(0);
        w.write_pointer(0)?;
        w.write_pointer(0)?;
        w.schedule(4, AlignmentMode::Left, |w, _| {
            w.schedule_string("CLS".to_string());
            w.schedule(4, AlignmentMode::Left, |w, s| {
                s.write_string(w, Some("cls_a"))?;
                w.write_f32(1.0);
                w.write_f32(2.0);
                Ok(())
            });
            // Undocumented block type the parser must step over.
            w.schedule_string("XYZ".to_string());
            w.schedule(4, AlignmentMode::Left, |w, _| {
                w.write_u32(0xFFFF_FFFF);
                w.write_u32(0xFFFF_FFFF);
                Ok(())
            });
            w.schedule_string("CLS".to_string());
            w.schedule(4, AlignmentMode::Left, |w, s| {
                s.write_string(w, Some("cls_b"))?;
                w.write_f32(3.0);
                w.write_f32(4.0);
                Ok(())
            });
            w.write_pointer(0)?;
            w.write_pointer(0)?;
            Ok(())
        });
        w.write_i32(s.len() as i32);
        w.schedule(4, AlignmentMode::Left, |w, s| s.write_region(w));
        w.write_pointer(0)?;
        w.write_i32(2);
        for _ in 0..7 {
            w.write_pointer(0)?;
        }
        Ok(())
    });
    w.write_u32(0);
    w.write_pointer(0).unwrap();
    w.write_u32(0);
    w.write_u32(0);
    let bytes = w.finish(&mut set).unwrap();

    let parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();
    assert_eq!(parsed.blocks.len(), 2);
    match (&parsed.blocks[0], &parsed.blocks[1]) {
        (Block::Cloth(a), Block::Cloth(b)) => {
            assert_eq!(a.name, "cls_a");
            assert_eq!(a.force, 1.0);
            assert_eq!(b.name, "cls_b");
            assert_eq!(b.force_gain, 4.0);
        }
        other => panic!("expected two cloth blocks, got {other:?}"),
    }
}

#[test]
fn ex_bone_id_carries_string_set_index() {
    let mut ex = BoneInfo::new(EX_BONE_ID_FLAG, "osage_root");
    ex.inverse_bind_pose_matrix = mat(1.0);
    let skin = Skin {
        bones: vec![ex],
        blocks: Vec::new(),
    };
    let bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();

    // Ex bone names are collected first, so "osage_root" is index 0.
    let ids_at = pointer_at(&bytes, HEADER_BONE_IDS) as usize;
    let id = LittleEndian::read_u32(&bytes[ids_at..ids_at + 4]);
    assert_eq!(id & EX_BONE_ID_FLAG, EX_BONE_ID_FLAG);
    assert_eq!(id & !EX_BONE_ID_FLAG, 0);

    let parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();
    assert_eq!(parsed.bones[0].name, "osage_root");
    assert!(parsed.bones[0].is_ex());
}

#[test]
fn sibling_entry_for_missing_bone_is_dropped() {
    let mut set = StringSet::new();
    for value in ["kl_a", "ghost_bone", "j_next", "osg_a"] {
        set.get_or_add(value);
    }

    let mut w = Writer::new(AddressSpace::Bits32);
    w.write_pointer(0).unwrap();
    w.write_pointer(0).unwrap();
    w.write_pointer(0).unwrap();
    w.schedule(4, AlignmentMode::Center, |w, s| {
        w.write_i32(0);
        w.write_i32(1); // one pooled osage bone
        w.write_u32(0);
        w.schedule(4, AlignmentMode::Left, |w, s| {
            w.write_u32(EX_BONE_ID_FLAG | s.get_or_add("kl_a") as u32);
            Ok(())
        });
        w.write_pointer(0)?;
        w.schedule(4, AlignmentMode::Left, |w, _| {
            w.schedule_string("OSG".to_string());
            w.schedule(4, AlignmentMode::Left, |w, s| {
                w.write_pointer(0)?; // node parent
                for _ in 0..9 {
                    w.write_f32(0.0);
                }
                w.write_u32(0); // start
                w.write_u32(1); // count
                s.write_string(w, Some("osg_a"))?;
                w.write_pointer(0)
            });
            w.write_pointer(0)?;
            w.write_pointer(0)?;
            Ok(())
        });
        w.write_i32(s.len() as i32);
        w.schedule(4, AlignmentMode::Left, |w, s| s.write_region(w));
        w.schedule(4, AlignmentMode::Left, |w, s| {
            // Entry naming a bone outside the pool: dropped, non-fatal.
            s.write_string(w, Some("ghost_bone"))?;
            s.write_string(w, Some("kl_a"))?;
            w.write_f32(1.5);
            // Valid entry for the pooled bone.
            s.write_string(w, Some("kl_a"))?;
            s.write_string(w, Some("j_next"))?;
            w.write_f32(2.0);
            s.write_string(w, None)
        });
        w.write_i32(0);
        for _ in 0..7 {
            w.write_pointer(0)?;
        }
        Ok(())
    });
    w.write_u32(0);
    w.write_pointer(0).unwrap();
    w.write_u32(0);
    w.write_u32(0);
    let bytes = w.finish(&mut set).unwrap();

    let parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();
    let Block::Osage(osage) = &parsed.blocks[0] else {
        panic!("expected an osage block");
    };
    assert_eq!(osage.bones.len(), 1);
    assert_eq!(osage.bones[0].name, "kl_a");
    assert_eq!(osage.bones[0].sibling_name.as_deref(), Some("j_next"));
    assert_eq!(osage.bones[0].sibling_distance, 2.0);
}

#[test]
fn parentless_skin_omits_parent_region() {
    let skin = Skin {
        bones: vec![BoneInfo::new(0, "n_hara"), BoneInfo::new(1, "n_kosi")],
        blocks: Vec::new(),
    };
    let bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();
    assert_eq!(pointer_at(&bytes, HEADER_PARENT_IDS), 0);
    let parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();
    assert!(parsed.bones.iter().all(|b| b.parent.is_none()));
}

#[test]
fn parent_links_round_trip_and_resolve_by_id() {
    let skin = sample_skin();
    let bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();
    let parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();
    assert_eq!(parsed.bones[0].parent, None);
    assert_eq!(parsed.bones[1].parent, Some(0));
    assert_eq!(parsed.bones[2].parent, Some(1));
}

#[test]
fn address_spaces_yield_the_same_document() {
    let skin = sample_skin();
    let narrow = skin.to_bytes(BinaryFormat::Ft).unwrap();
    let wide = skin.to_bytes(BinaryFormat::X).unwrap();
    assert_ne!(narrow.len(), wide.len());
    assert_eq!(
        LittleEndian::read_u32(&narrow[HEADER_BONE_COUNT..HEADER_BONE_COUNT + 4]),
        3
    );
    // 64-bit header: four 8-byte pointers before the count.
    assert_eq!(LittleEndian::read_u32(&wide[32..36]), 3);

    let from_narrow = Skin::from_bytes(&narrow, BinaryFormat::Ft).unwrap();
    let from_wide = Skin::from_bytes(&wide, BinaryFormat::X).unwrap();
    assert_eq!(from_narrow, from_wide);
    assert_eq!(from_narrow, skin);
}

#[test]
fn nonzero_reserved_header_field_is_fatal() {
    let skin = sample_skin();
    let mut bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();
    bytes[HEADER_RESERVED + 1] = 0x7;
    match Skin::from_bytes(&bytes, BinaryFormat::Ft) {
        Err(Error::ReservedFieldViolation { offset }) => {
            assert_eq!(offset, HEADER_RESERVED + 1);
        }
        other => panic!("expected ReservedFieldViolation, got {other:?}"),
    }
}

#[test]
fn truncated_input_is_fatal() {
    let skin = sample_skin();
    let bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();
    let result = Skin::from_bytes(&bytes[..16], BinaryFormat::Ft);
    assert!(matches!(result, Err(Error::UnexpectedEnd { .. })));
}

#[test]
fn mutated_document_reserializes_from_current_state() {
    let skin = sample_skin();
    let bytes = skin.to_bytes(BinaryFormat::Ft).unwrap();
    let mut parsed = Skin::from_bytes(&bytes, BinaryFormat::Ft).unwrap();

    // Out-of-band edits: rename a bone, grow an osage chain, add a block.
    parsed.bones[0].name = "n_hara_cp".to_string();
    if let Block::Osage(osage) = &mut parsed.blocks[0] {
        osage.bones.push(OsageBone::new("j_hair_02"));
    }
    parsed.blocks.push(Block::Cloth(ClothBlock {
        name: "cls_extra".to_string(),
        force: 0.9,
        force_gain: 0.2,
    }));

    let rewritten = parsed.to_bytes(BinaryFormat::Ft).unwrap();
    let reread = Skin::from_bytes(&rewritten, BinaryFormat::Ft).unwrap();
    assert_eq!(reread, parsed);
    assert_eq!(reread.bones[0].name, "n_hara_cp");
    let Block::Osage(osage) = &reread.blocks[0] else {
        panic!("expected an osage block");
    };
    assert_eq!(osage.bones.len(), 3);
    assert!(matches!(&reread.blocks[5], Block::Cloth(c) if c.name == "cls_extra"));
}
